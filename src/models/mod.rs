pub mod activity;
pub mod answer;
pub mod attempt;
pub mod exam;
pub mod media;
pub mod payload;
pub mod question;
pub mod request;
