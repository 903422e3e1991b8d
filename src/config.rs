use std::env::{self, VarError};

use anyhow::Context;
use rearch::{CData, CapsuleHandle, Container};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DbConn};
use tracing::{info, instrument, warn};
use url::Url;

use crate::orm::SCHEMA_SQL;

/// # Errors
/// Will return [`Err`] if the connection to the database or the schema setup fails.
#[instrument]
pub async fn init_container() -> anyhow::Result<Container> {
    info!("Initializing container");
    let container = Container::new();

    let (db_connection_options, set_db_conn) =
        container.read((db_connection_options_capsule, db_conn_init_action));

    info!(?db_connection_options, "Connecting to database");
    let db = Database::connect(db_connection_options).await?;

    info!("Applying database schema");
    db.execute_unprepared(SCHEMA_SQL)
        .await
        .context("Failed to apply database schema")?;
    set_db_conn(db);

    info!("Container initialized");
    Ok(container)
}

/// # Panics
/// Panics when environment variable is not set or is invalid.
#[must_use]
pub fn db_connection_options_capsule(_: CapsuleHandle) -> ConnectOptions {
    const ENV_VAR_NAME: &str = "DATABASE_URL";
    env::var(ENV_VAR_NAME)
        .unwrap_or_else(|err| match err {
            VarError::NotPresent => panic!("{ENV_VAR_NAME} is not set"),
            VarError::NotUnicode(actual) => {
                panic!("{ENV_VAR_NAME} is invalid unicode: {}", actual.display());
            }
        })
        .into()
}

fn db_conn_manager(
    CapsuleHandle { register, .. }: CapsuleHandle,
) -> (Option<DbConn>, impl use<> + CData + Fn(Option<DbConn>)) {
    register.register(rearch_effects::state::<rearch_effects::Cloned<_>>(None))
}

pub fn db_conn_init_action(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> impl use<> + CData + Fn(DbConn) {
    let set_db_conn = get.as_ref(db_conn_manager).1.clone();
    move |db| set_db_conn(Some(db))
}

/// # Panics
/// Panics when the [`DbConn`] was not set via [`db_conn_init_action`].
pub fn db_conn_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> DbConn {
    let db_conn = get.as_ref(db_conn_manager).0.clone();
    db_conn.expect("DbConn should've been set via db_conn_init_action!")
}

/// # Panics
/// Panics when environment variable is invalid.
pub fn addr_capsule(_: CapsuleHandle) -> String {
    const ENV_VAR_NAME: &str = "ADDR";
    const DEFAULT_ADDR: &str = "127.0.0.1:3000";

    optional_env_var(ENV_VAR_NAME).unwrap_or_else(|| {
        warn!(
            addr = DEFAULT_ADDR,
            "{ENV_VAR_NAME} environment variable not set; defaulting to {DEFAULT_ADDR}"
        );
        DEFAULT_ADDR.to_owned()
    })
}

/// Prefix of the shareable URLs handed out for new pastes.
///
/// # Panics
/// Panics when environment variable is invalid or not a URL.
pub fn base_url_capsule(_: CapsuleHandle) -> Url {
    const ENV_VAR_NAME: &str = "BASE_URL";
    const DEFAULT_BASE_URL: &str = "http://localhost:3000";

    let base_url = optional_env_var(ENV_VAR_NAME).unwrap_or_else(|| {
        warn!(
            base_url = DEFAULT_BASE_URL,
            "{ENV_VAR_NAME} environment variable not set; defaulting to {DEFAULT_BASE_URL}"
        );
        DEFAULT_BASE_URL.to_owned()
    });
    Url::parse(&base_url)
        .unwrap_or_else(|err| panic!("{ENV_VAR_NAME} is not a valid URL ({base_url}): {err}"))
}

/// Whether clients may override the clock used for expiry checks.
///
/// Read once per container, so every request sees the same value.
///
/// # Panics
/// Panics when environment variable is invalid.
pub fn test_mode_capsule(_: CapsuleHandle) -> bool {
    const ENV_VAR_NAME: &str = "TEST_MODE";

    let test_mode = optional_env_var(ENV_VAR_NAME).is_some_and(|value| value == "1");
    if test_mode {
        warn!("{ENV_VAR_NAME} is enabled; clients may override the current time");
    } else {
        info!("{ENV_VAR_NAME} is disabled");
    }
    test_mode
}

fn optional_env_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            info!(name, value, "Environment variable set");
            Some(value)
        }
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(actual)) => {
            panic!(
                "{name} environment variable is invalid: {}",
                actual.display()
            );
        }
    }
}
