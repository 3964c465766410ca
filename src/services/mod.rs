pub mod bulk_send_service;
pub mod credential_service;
#[cfg(test)]
pub(crate) mod fakes;
pub mod health_service;
pub mod history_service;
pub mod message_builder;
pub mod recipient_service;
