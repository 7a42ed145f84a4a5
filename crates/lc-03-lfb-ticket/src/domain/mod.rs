pub mod config;
pub mod errors;
pub mod ticket;

pub use config::LfbTicketConfig;
pub use errors::{LfbTicketError, LfbTicketResult};
pub use ticket::LfbTicket;
