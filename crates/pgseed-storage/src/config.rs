//! Layered configuration: built-in defaults, an optional YAML file, then environment.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

use crate::ident::{IdentError, QualifiedTable, SqlIdent, SqlLiteral};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_DB_HOST: &str = "DB_HOST";
pub const ENV_DB_PORT: &str = "DB_PORT";
pub const ENV_DB_NAME: &str = "DB_NAME";
pub const ENV_DB_USER: &str = "DB_USER";
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";
pub const ENV_MAX_CONNECTIONS: &str = "PGSEED_MAX_CONNECTIONS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "PGSEED_CONNECT_TIMEOUT_SECS";
pub const ENV_FORMS_SCHEMA: &str = "PGSEED_FORMS_SCHEMA";
pub const ENV_FORMS_TABLE: &str = "PGSEED_FORMS_TABLE";
pub const ENV_FORM_FIELDS_TABLE: &str = "PGSEED_FORM_FIELDS_TABLE";
pub const ENV_FORM_FIELD_MAPPING_TABLE: &str = "PGSEED_FORM_FIELD_MAPPING_TABLE";
pub const ENV_CATEGORY_SCHEMA: &str = "PGSEED_CATEGORY_SCHEMA";
pub const ENV_CATEGORY_TABLE: &str = "PGSEED_CATEGORY_TABLE";
pub const ENV_CATEGORY_TYPE: &str = "PGSEED_CATEGORY_TYPE";
pub const ENV_CATEGORY_VISIBILITY: &str = "PGSEED_CATEGORY_VISIBILITY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: {source}")]
    Ident {
        key: &'static str,
        #[source]
        source: IdentError,
    },
    #[error("{key}: expected a positive number, got {value:?}")]
    Number { key: &'static str, value: String },
}

/// Shape of the optional YAML file. Every key may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub forms: FormsSection,
    pub categories: CategoriesSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_connections: Option<u32>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormsSection {
    pub schema: Option<String>,
    pub forms_table: Option<String>,
    pub fields_table: Option<String>,
    pub mapping_table: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CategoriesSection {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub category_type: Option<String>,
    pub visibility_scope: Option<String>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url);
        }
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user);
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        Ok(options)
    }

    /// Connection target rebuilt from its parts, so no password can appear.
    pub fn display_target(&self) -> String {
        let Some(url) = &self.url else {
            return format!(
                "postgres://{}@{}:{}/{}",
                self.user, self.host, self.port, self.database
            );
        };
        match PgConnectOptions::from_str(url) {
            Ok(options) => format!(
                "postgres://{}@{}:{}/{}",
                options.get_username(),
                options.get_host(),
                options.get_port(),
                options.get_database().unwrap_or_default()
            ),
            Err(_) => "postgres://<unparseable DATABASE_URL>".to_string(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("target", &self.display_target())
            .field("max_connections", &self.max_connections)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormTables {
    pub forms: QualifiedTable,
    pub fields: QualifiedTable,
    pub mappings: QualifiedTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTables {
    pub categories: QualifiedTable,
    pub category_type: SqlLiteral,
    pub visibility_scope: SqlLiteral,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub forms: FormTables,
    pub categories: CategoryTables,
}

impl AppConfig {
    /// Reads the optional YAML file and overlays the process environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => ConfigFile::read(path)?,
            None => ConfigFile::default(),
        };
        let config = Self::from_sources(file, |key| std::env::var(key).ok())
            .context("validating configuration")?;
        Ok(config)
    }

    /// Builds the configuration from a parsed file and an environment lookup.
    pub fn from_sources<F>(file: ConfigFile, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let text = |key: &str, file_value: Option<String>, default: &str| {
            lookup(key)
                .or(file_value)
                .unwrap_or_else(|| default.to_string())
        };

        let db = file.database;
        let database = DatabaseConfig {
            url: lookup(ENV_DATABASE_URL).or(db.url),
            host: text(ENV_DB_HOST, db.host, "localhost"),
            port: number(ENV_DB_PORT, lookup(ENV_DB_PORT), db.port, 5432)?,
            database: text(ENV_DB_NAME, db.name, "postgres"),
            user: text(ENV_DB_USER, db.user, "postgres"),
            password: lookup(ENV_DB_PASSWORD).or(db.password),
            max_connections: number(
                ENV_MAX_CONNECTIONS,
                lookup(ENV_MAX_CONNECTIONS),
                db.max_connections,
                2,
            )?,
            connect_timeout: Duration::from_secs(number(
                ENV_CONNECT_TIMEOUT_SECS,
                lookup(ENV_CONNECT_TIMEOUT_SECS),
                db.connect_timeout_secs,
                10,
            )?),
        };

        let forms_schema = schema(
            ENV_FORMS_SCHEMA,
            &text(ENV_FORMS_SCHEMA, file.forms.schema, "public"),
        )?;
        let forms = FormTables {
            forms: table(
                ENV_FORMS_TABLE,
                &forms_schema,
                &text(ENV_FORMS_TABLE, file.forms.forms_table, "forms"),
            )?,
            fields: table(
                ENV_FORM_FIELDS_TABLE,
                &forms_schema,
                &text(ENV_FORM_FIELDS_TABLE, file.forms.fields_table, "form_fields"),
            )?,
            mappings: table(
                ENV_FORM_FIELD_MAPPING_TABLE,
                &forms_schema,
                &text(
                    ENV_FORM_FIELD_MAPPING_TABLE,
                    file.forms.mapping_table,
                    "form_field_mapping",
                ),
            )?,
        };

        let category_schema = schema(
            ENV_CATEGORY_SCHEMA,
            &text(ENV_CATEGORY_SCHEMA, file.categories.schema, "public"),
        )?;
        let categories = CategoryTables {
            categories: table(
                ENV_CATEGORY_TABLE,
                &category_schema,
                &text(ENV_CATEGORY_TABLE, file.categories.table, "categories"),
            )?,
            category_type: literal(
                ENV_CATEGORY_TYPE,
                &text(ENV_CATEGORY_TYPE, file.categories.category_type, "OTHER"),
            )?,
            visibility_scope: literal(
                ENV_CATEGORY_VISIBILITY,
                &text(
                    ENV_CATEGORY_VISIBILITY,
                    file.categories.visibility_scope,
                    "PUBLIC",
                ),
            )?,
        };

        Ok(Self {
            database,
            forms,
            categories,
        })
    }
}

fn number<T>(
    key: &'static str,
    env_value: Option<String>,
    file_value: Option<T>,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + ToString,
{
    let value = match env_value {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Number {
            key,
            value: raw.clone(),
        })?,
        None => file_value.unwrap_or(default),
    };
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::Number {
            key,
            value: value.to_string(),
        })
    }
}

fn schema(key: &'static str, raw: &str) -> Result<SqlIdent, ConfigError> {
    SqlIdent::parse(raw).map_err(|source| ConfigError::Ident { key, source })
}

fn table(key: &'static str, schema: &SqlIdent, name: &str) -> Result<QualifiedTable, ConfigError> {
    QualifiedTable::parse(schema.as_str(), name).map_err(|source| ConfigError::Ident { key, source })
}

fn literal(key: &'static str, raw: &str) -> Result<SqlLiteral, ConfigError> {
    SqlLiteral::parse(raw).map_err(|source| ConfigError::Ident { key, source })
}
