mod err;
mod helpers;
mod options;
mod packet;

pub use err::FormatError;
pub use options::{join, DhcpMessageTypes, DhcpOption, OptionCodes};
pub use packet::{DhcpMessage, TransactionKey, BOOT_REQUEST, BOOT_REPLY};

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;
