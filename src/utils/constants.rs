/// Archive layout, tool names and default settings

/// Sub-folder holding the dump of everything except the user tables
pub const NO_USER_TABLES_BACKUP_SUB_FOLDER: &str = "everything_but_user_tables";

/// Prefix of each batch sub-folder; the batch number is appended
pub const USER_TABLES_BATCH_FOLDER_PREFIX: &str = "user_tables_batch_";

/// Default number of user tables dumped per pg_dump invocation
pub const DEFAULT_BATCH_SIZE: usize = 60;

/// Default PostgreSQL port
pub const DEFAULT_PORT: u16 = 5432;

/// Default number of parallel jobs passed to pg_dump / pg_restore
pub const DEFAULT_JOBS: u32 = 1;

pub const DEFAULT_PG_DUMP: &str = "pg_dump";
pub const DEFAULT_PG_RESTORE: &str = "pg_restore";

/// Naming prefixes of the dynamically created tables
pub const DEFAULT_USER_TABLE_PREFIX: &str = "database_table_";
pub const DEFAULT_LINK_RELATION_PREFIX: &str = "database_relation_";
pub const DEFAULT_MULTIPLE_SELECT_PREFIX: &str = "database_multipleselect_";

/// Directory name under the user config dir
pub const CONFIG_DIR_NAME: &str = "tenant-backup";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Folder name for a batch number
pub fn batch_folder_name(batch_num: usize) -> String {
    format!("{}{}", USER_TABLES_BATCH_FOLDER_PREFIX, batch_num)
}

/// Batch number encoded in a folder name, if it is a batch folder
pub fn parse_batch_folder_name(name: &str) -> Option<usize> {
    name.strip_prefix(USER_TABLES_BATCH_FOLDER_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_folder_names() {
        assert_eq!(batch_folder_name(0), "user_tables_batch_0");
        assert_eq!(parse_batch_folder_name("user_tables_batch_12"), Some(12));
        assert_eq!(parse_batch_folder_name("user_tables_batch_x"), None);
        assert_eq!(parse_batch_folder_name(NO_USER_TABLES_BACKUP_SUB_FOLDER), None);
    }
}
