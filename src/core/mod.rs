pub mod action;
pub mod credentials;
pub mod cursor;
pub mod message;
pub mod tab;
