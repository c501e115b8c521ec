#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod origin;
pub mod proxy_server;

pub use origin::{closed_port_addr, EchoServer, SilentServer, TestOrigin, TlsOrigin, HELLO_BODY};
pub use proxy_server::{read_response_head, test_settings, TestProxyServer};
