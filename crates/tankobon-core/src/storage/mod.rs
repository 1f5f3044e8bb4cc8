pub mod backup_json;
