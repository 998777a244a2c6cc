pub mod dashboard;
pub mod medicines;
pub mod orders;
pub mod profile;
