pub mod analysis;
pub mod correction;
pub mod customer;
pub mod product;
pub mod request;
