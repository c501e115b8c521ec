mod dialer;
mod resolver;

pub use dialer::TcpDialer;
pub use resolver::TokioHostResolver;
