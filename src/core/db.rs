//! Database and application-cache payloads.
//!
//! These are the operational steps around a deploy: creating the database at
//! setup, dumping it before migrations, running migrations, and clearing the
//! application cache. Each builder returns the commands; running them is the
//! pipeline's job.

use crate::config::DbCredentials;
use crate::paths::join_remote;
use crate::remote::RemoteCommand;

/// Timestamp format of backup artifacts under `shared/backups/`.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Name of the shared child holding database dumps.
pub const BACKUP_DIR: &str = "backups";

/// Quote a value as a MySQL string literal.
fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Quote a value as a MySQL identifier.
fn sql_identifier(value: &str) -> String {
    format!("`{}`", value.replace('`', "``"))
}

/// Create the database and grant the deploy user full access to it.
pub fn createdb_commands(db: &DbCredentials) -> Vec<RemoteCommand> {
    let grant = format!(
        "GRANT ALL ON {}.* TO {}@'localhost' IDENTIFIED BY {}",
        sql_identifier(&db.name),
        sql_string(&db.username),
        sql_string(&db.password)
    );

    vec![
        RemoteCommand::new("mysqladmin").args(["create", db.name.as_str()]),
        RemoteCommand::new("mysql").args(["-e", grant.as_str()]),
    ]
}

/// Path of the dump written at `timestamp`. drush appends `.gz` itself.
pub fn backup_path(shared: &str, timestamp: &str) -> String {
    join_remote(&join_remote(shared, BACKUP_DIR), &format!("{}.sql", timestamp))
}

/// Current UTC time in [`BACKUP_TIMESTAMP_FORMAT`].
pub fn backup_timestamp() -> String {
    chrono::Utc::now().format(BACKUP_TIMESTAMP_FORMAT).to_string()
}

pub fn backup_command(release_path: &str, shared: &str, timestamp: &str) -> RemoteCommand {
    RemoteCommand::new("drush").args([
        "-r".to_string(),
        release_path.to_string(),
        "sql-dump".to_string(),
        "--gzip".to_string(),
        format!("--result-file={}", backup_path(shared, timestamp)),
    ])
}

pub fn updatedb_command(release_path: &str) -> RemoteCommand {
    RemoteCommand::new("drush").args(["-r", release_path, "updatedb", "-y"])
}

pub fn cache_clear_command(release_path: &str) -> RemoteCommand {
    RemoteCommand::new("drush").args(["-r", release_path, "cc", "all"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(password: &str) -> DbCredentials {
        DbCredentials {
            name: "prod_site".to_string(),
            username: "prod_site".to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn createdb_creates_then_grants() {
        let commands = createdb_commands(&credentials("pw"));
        assert_eq!(commands[0].to_shell(), "mysqladmin create prod_site");
        assert_eq!(
            commands[1].args,
            vec![
                "-e",
                "GRANT ALL ON `prod_site`.* TO 'prod_site'@'localhost' IDENTIFIED BY 'pw'"
            ]
        );
    }

    #[test]
    fn grant_escapes_quotes_in_password() {
        let commands = createdb_commands(&credentials("it's"));
        assert!(commands[1].args[1].ends_with("IDENTIFIED BY 'it\\'s'"));
    }

    #[test]
    fn backup_lands_in_shared_backups() {
        let cmd = backup_command("/srv/app/releases/1", "/srv/app/shared", "2024-01-01T00-00-00");
        assert_eq!(
            cmd.to_shell(),
            "drush -r /srv/app/releases/1 sql-dump --gzip --result-file=/srv/app/shared/backups/2024-01-01T00-00-00.sql"
        );
    }

    #[test]
    fn backup_timestamp_has_no_colons() {
        let ts = backup_timestamp();
        assert_eq!(ts.len(), 19);
        assert!(!ts.contains(':'));
    }

    #[test]
    fn drush_steps_target_the_release() {
        assert_eq!(
            updatedb_command("/srv/app/releases/1").to_shell(),
            "drush -r /srv/app/releases/1 updatedb -y"
        );
        assert_eq!(
            cache_clear_command("/srv/app/releases/1").to_shell(),
            "drush -r /srv/app/releases/1 cc all"
        );
    }
}
