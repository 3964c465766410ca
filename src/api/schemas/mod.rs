pub mod bulk;
pub mod health;
pub mod verify;
