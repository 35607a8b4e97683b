pub mod capabilities;
pub mod db;
pub mod mail;
pub mod push;

pub use capabilities::PgCapabilities;
pub use db::PgStore;
pub use mail::OutboxMailSender;
pub use push::WsHub;
