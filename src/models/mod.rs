pub mod delivery_task;
pub mod notification;
pub mod profile;
