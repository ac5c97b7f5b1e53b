pub mod inventory;
pub mod lowlevel;
pub mod session;
pub mod types;
pub mod views;
pub mod vmgroup;

#[cfg(test)]
pub mod testing;
