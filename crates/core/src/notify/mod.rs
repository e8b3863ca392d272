pub mod channel;
pub mod dispatcher;
pub mod telegram;
pub mod whatsapp;
