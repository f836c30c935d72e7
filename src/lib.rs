pub mod error;
pub mod format;
pub mod block;
pub mod directory;
pub mod element;
pub mod container;
pub mod unpack;

pub use error::{Error, Result};
pub use format::{AddressFormat, ContainerHeader, ElementAddress, FormatError};
pub use block::{BlockChainReader, BlockHeader, Classification};
pub use directory::ContainerDirectory;
pub use element::Element;
pub use container::{is_container, Container, ElementStream, Files};
pub use unpack::{unpack_flat, unpack_recursive, UnpackReport};
