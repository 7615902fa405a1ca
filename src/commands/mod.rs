pub mod clouds;
pub mod instance;
