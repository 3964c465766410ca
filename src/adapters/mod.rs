pub mod credentials;
pub mod database;
pub mod smtp;
pub mod spreadsheet;
