pub mod analytics;
pub mod config;
pub mod export;
pub mod import;
pub mod migrate;

use canvass_core::config::{AppConfig, LoadOptions};
use canvass_core::domain::survey::SurveyId;
use canvass_core::errors::{ApplicationError, DomainError};
use canvass_db::{connect, migrations, DbPool, SurveyService};
use serde::Serialize;
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    /// A JSON document followed by the outcome line.
    pub fn success_with_document(
        command: &str,
        document: &impl Serialize,
        message: impl Into<String>,
    ) -> Self {
        match serde_json::to_string_pretty(document) {
            Ok(body) => {
                let outcome = Self::success(command, message);
                Self { exit_code: 0, output: format!("{body}\n{}", outcome.output) }
            }
            Err(error) => Self::failure(command, "serialization", error.to_string(), 6),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn from_failure(command: &str, failure: Failure) -> Self {
        Self::failure(command, failure.error_class, failure.message, failure.exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Classified command failure; the exit code is stable per class.
#[derive(Debug)]
pub(crate) struct Failure {
    error_class: &'static str,
    message: String,
    exit_code: u8,
}

impl Failure {
    pub(crate) fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code }
    }

    pub(crate) fn input(message: impl Into<String>) -> Self {
        Self::new("invalid_input", message, 6)
    }
}

impl From<ApplicationError> for Failure {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Domain(domain) => match &domain {
                DomainError::NotFound { .. } => Self::new("not_found", domain.reason(), 7),
                DomainError::Validation(_) => Self::new("validation", domain.reason(), 8),
                DomainError::Forbidden(_) => Self::new("forbidden", domain.reason(), 9),
            },
            ApplicationError::Persistence(message) => Self::new("persistence", message, 10),
            ApplicationError::Configuration(message) => {
                Self::new("config_validation", message, 2)
            }
        }
    }
}

/// Loads configuration and builds the current-thread runtime every
/// database-backed command runs on.
pub(crate) fn prepare(command: &str) -> Result<(AppConfig, Runtime), CommandResult> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;

    Ok((config, runtime))
}

pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect(&config.database)
        .await
        .map_err(|error| Failure::new("db_connectivity", error.to_string(), 4))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| Failure::new("migration", error.to_string(), 5))?;
    Ok(pool)
}

/// Runs `operation` against a migrated store and closes the pool afterwards,
/// whatever the outcome.
pub(crate) fn with_service<T, F, Fut>(
    command: &str,
    operation: F,
) -> Result<T, CommandResult>
where
    F: FnOnce(SurveyService) -> Fut,
    Fut: std::future::Future<Output = Result<T, Failure>>,
{
    let (config, runtime) = prepare(command)?;
    runtime
        .block_on(async {
            let pool = open_pool(&config).await?;
            let service = SurveyService::sqlite(pool.clone(), config.survey.clone());
            let result = operation(service).await;
            pool.close().await;
            result
        })
        .map_err(|failure| CommandResult::from_failure(command, failure))
}

pub(crate) fn parse_survey_id(raw: &str) -> Result<SurveyId, Failure> {
    SurveyId::parse(raw).ok_or_else(|| Failure::input(format!("not a survey id: {raw}")))
}

pub(crate) fn correlation_id(command: &str) -> String {
    format!("cli-{command}-{}", uuid::Uuid::new_v4())
}
