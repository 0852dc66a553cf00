//! Backup and restore of multi-tenant PostgreSQL databases.
//!
//! Shared tables are dumped in one `pg_dump` run, the dynamically created user
//! tables in bounded batches, and everything is packed into one self-describing
//! `.tar.gz` archive that `restore` can unpack and replay with `pg_restore`.

pub mod core;
pub mod utils;
