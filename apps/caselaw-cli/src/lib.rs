pub mod remote;

pub use remote::RemoteGenerator;
