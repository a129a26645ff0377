//! Initialisation of the global tracing subscriber.
//!
//! Two outputs are supported: plain console logs and JSON logs written to rolling files. See
//! [`Tracing::pre_configured`] for the environment variables and CLI arguments involved.
use std::path::PathBuf;

use snafu::{ResultExt as _, Snafu};
use tracing::{level_filters::LevelFilter, subscriber::SetGlobalDefaultError};
use tracing_appender::rolling::{InitError, Rotation, RollingFileAppender};
use tracing_subscriber::{EnvFilter, Layer, Registry, filter::Directive, layer::SubscriberExt};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors which can be encountered when initialising [`Tracing`].
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender"))]
    InitRollingFileAppender { source: InitError },

    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber { source: SetGlobalDefaultError },
}

/// Settings of the console output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsoleLogSettings {
    pub environment_variable: &'static str,
    pub default_level: LevelFilter,
}

/// Settings of the rolling file output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileLogSettings {
    pub environment_variable: &'static str,
    pub default_level: LevelFilter,
    pub file_log_dir: PathBuf,
    pub rotation_period: RotationPeriod,
}

/// A set of pre-configured tracing subscriber layers.
///
/// The layers are installed as the global default subscriber by [`Tracing::init`]. Keep the
/// returned value around for as long as the application runs.
///
/// ```no_run
/// use serving_openshift::telemetry::{TelemetryOptions, Tracing};
///
/// let _tracing_guard = Tracing::pre_configured("serving-openshift-webhook", TelemetryOptions::default())
///     .init()
///     .unwrap();
///
/// tracing::info!("log a message");
/// ```
#[derive(Debug)]
pub struct Tracing {
    service_name: &'static str,
    console_log_settings: Option<ConsoleLogSettings>,
    file_log_settings: Option<FileLogSettings>,
}

impl Tracing {
    /// The environment variable used to set the console log level filter.
    pub const CONSOLE_LOG_LEVEL: &str = "CONSOLE_LOG_LEVEL";
    /// The environment variable used to set the rolling file log level filter.
    pub const FILE_LOG_LEVEL: &str = "FILE_LOG_LEVEL";
    /// The filename suffix used for the rolling file logs.
    pub const FILE_LOG_SUFFIX: &str = "tracing-rs.json";

    pub fn builder(service_name: &'static str) -> TracingBuilder {
        TracingBuilder {
            service_name,
            console_log_settings: None,
            file_log_settings: None,
        }
    }

    /// Creates a [`Tracing`] instance configured from `options`.
    ///
    /// - Console logs are enabled unless `--console-log-disabled` is set. The level is read
    ///   from `CONSOLE_LOG_LEVEL` and defaults to INFO.
    /// - File logs are enabled when `--file-log-directory` is set. The level is read from
    ///   `FILE_LOG_LEVEL` and defaults to INFO. Files roll over after
    ///   `--file-log-rotation-period`, which defaults to [`RotationPeriod::Never`].
    pub fn pre_configured(service_name: &'static str, options: TelemetryOptions) -> Self {
        let TelemetryOptions {
            console_log_disabled,
            file_log_directory,
            file_log_rotation_period,
        } = options;

        Self::builder(service_name)
            .with_console_output((!console_log_disabled).then_some(ConsoleLogSettings {
                environment_variable: Self::CONSOLE_LOG_LEVEL,
                default_level: LevelFilter::INFO,
            }))
            .with_file_output(file_log_directory.map(|file_log_dir| FileLogSettings {
                environment_variable: Self::FILE_LOG_LEVEL,
                default_level: LevelFilter::INFO,
                file_log_dir,
                rotation_period: file_log_rotation_period.unwrap_or_default(),
            }))
            .build()
    }

    /// Installs the configured layers as the global default subscriber.
    pub fn init(self) -> Result<Tracing> {
        let mut layers: Vec<Box<dyn Layer<Registry> + Sync + Send>> = Vec::new();

        if let Some(settings) = &self.console_log_settings {
            let env_filter_layer =
                env_filter_builder(settings.environment_variable, settings.default_level);
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_filter(env_filter_layer)
                    .boxed(),
            );
        }

        if let Some(settings) = &self.file_log_settings {
            let env_filter_layer =
                env_filter_builder(settings.environment_variable, settings.default_level);

            let file_appender = RollingFileAppender::builder()
                .rotation(settings.rotation_period.clone().into())
                .filename_prefix(self.service_name)
                .filename_suffix(Self::FILE_LOG_SUFFIX)
                .build(&settings.file_log_dir)
                .context(InitRollingFileAppenderSnafu)?;

            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(file_appender)
                    .with_filter(env_filter_layer)
                    .boxed(),
            );
        }

        if !layers.is_empty() {
            tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layers))
                .context(SetGlobalDefaultSubscriberSnafu)?;
        }

        Ok(self)
    }
}

/// Builds a [`Tracing`] instance. Outputs which are not configured stay disabled.
pub struct TracingBuilder {
    service_name: &'static str,
    console_log_settings: Option<ConsoleLogSettings>,
    file_log_settings: Option<FileLogSettings>,
}

impl TracingBuilder {
    pub fn with_console_output(self, settings: impl Into<Option<ConsoleLogSettings>>) -> Self {
        Self {
            console_log_settings: settings.into(),
            ..self
        }
    }

    pub fn with_file_output(self, settings: impl Into<Option<FileLogSettings>>) -> Self {
        Self {
            file_log_settings: settings.into(),
            ..self
        }
    }

    pub fn build(self) -> Tracing {
        Tracing {
            service_name: self.service_name,
            console_log_settings: self.console_log_settings,
            file_log_settings: self.file_log_settings,
        }
    }
}

/// Create an [`EnvFilter`] configured with the given environment variable and default [`Directive`].
fn env_filter_builder(env_var: &str, default_directive: impl Into<Directive>) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(env_var)
        .with_default_directive(default_directive.into())
        .from_env_lossy()
}

/// Telemetry related CLI arguments, passed to [`Tracing::pre_configured`].
#[derive(clap::Args, Clone, Debug, Default, PartialEq, Eq)]
pub struct TelemetryOptions {
    /// Disable console logs.
    #[arg(long, env)]
    pub console_log_disabled: bool,

    /// Enable logging to files located in the specified DIRECTORY.
    #[arg(long, env, value_name = "DIRECTORY", group = "file_log")]
    pub file_log_directory: Option<PathBuf>,

    /// Time PERIOD after which log files are rolled over.
    #[arg(long, env, value_name = "PERIOD", requires = "file_log")]
    pub file_log_rotation_period: Option<RotationPeriod>,
}

/// Supported periods when the log file is rolled over.
#[derive(
    clap::ValueEnum, Clone, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "PascalCase")]
pub enum RotationPeriod {
    Minutely,
    Hourly,
    Daily,

    #[default]
    Never,
}

impl From<RotationPeriod> for Rotation {
    fn from(value: RotationPeriod) -> Self {
        match value {
            RotationPeriod::Minutely => Self::MINUTELY,
            RotationPeriod::Hourly => Self::HOURLY,
            RotationPeriod::Daily => Self::DAILY,
            RotationPeriod::Never => Self::NEVER,
        }
    }
}
