pub mod db;
mod sqlite_impl;

pub use sqlite_impl::SqliteDatabase;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
