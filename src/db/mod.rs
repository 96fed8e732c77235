mod memory;
mod mysql;
mod store;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;
pub use store::*;

/// Wall-clock timestamp stored in create_time / update_time
pub fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}
