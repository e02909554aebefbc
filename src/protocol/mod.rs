//! The five-operation authentication protocol
//!
//! | type       | needs                        | yields      |
//! |------------|------------------------------|-------------|
//! | signup     | username, publicKey          |             |
//! | challenge  | username                     | challenge   |
//! | login      | username, signedChallenge    | token       |
//! | logout     | token                        |             |
//! | getprofile | token                        | username    |

pub mod handler;
pub mod request;
pub mod response;

pub use handler::ProtocolHandler;
pub use request::{Fields, Request};
pub use response::{Response, Status};
