mod listener;
pub use self::listener::TcpListener;

mod socket;
pub use self::socket::{TcpKeepalive, TcpSocket};

mod stream;
pub use self::stream::TcpStream;
