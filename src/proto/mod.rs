pub mod command;
pub mod enums;
pub mod event;
pub mod packet;
pub mod payload;
