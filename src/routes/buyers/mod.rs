pub mod carts;
pub mod medicines;
pub mod orders;
pub mod pharmacies;
pub mod profile;
