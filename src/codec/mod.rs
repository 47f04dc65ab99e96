//! DrCOM wire format.
//!
//! Pure functions only: building request datagrams, hashing, and
//! interpreting server replies. Nothing here touches a socket.
//!
//! ```text
//! discovery   01 02 <nonce LE16> 0a 00*15            -> 02 02 <nonce> <salt:4>
//! login       03 01 00 <L+20> ... (330 bytes)        -> 04 .. <auth_info @23> | 05 .. <code @32>
//! probe       ff <md5> 000000 <auth_info> <t BE16>   -> 07
//! heartbeat   07 <seq> 28 00 0b <cls> ... (40 bytes) -> 07 .. <key @16>
//! logout      01 03 00 00 0a 00*15                   -> 02 03
//!             06 01 00 <L+20> ... <auth_info>        -> 04
//! ```

pub mod checksum;
pub mod packet;
pub mod response;

pub use checksum::{checksum, hash_a, md5};
pub use packet::{
    build_discovery, build_heartbeat, build_heartbeat_probe, build_login, build_logout,
    build_logout_prelude, HeartbeatClass,
};
pub use response::{
    discovery_salt, expect_heartbeat, expect_kind, expect_login, expect_logout_challenge,
    ResponseKind,
};
