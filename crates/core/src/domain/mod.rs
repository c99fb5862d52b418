pub mod document;
pub mod filing;
pub mod user;
