pub mod resource_controller;
#[macro_use]
pub mod shortcuts;
pub mod traits;

pub fn get_version_string() -> String {
    format!("{}-{}", env!("GIT_COUNT"), env!("GIT_HASH"))
}
