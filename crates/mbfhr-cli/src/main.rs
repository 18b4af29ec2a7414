//! mbfhr - command-line client for the MBF HR backend.
//!
//! Signs in once, keeps the session alive with proactive token refresh, and
//! exposes the employee, attendance, leave and payroll endpoints as commands.

mod commands;
mod format;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mbfhr_core::api::http_client;
use mbfhr_core::auth::AuthBackend;
use mbfhr_core::config::BACKEND_URL_ENV;
use mbfhr_core::models::{AttendanceStatus, LeaveType};
use mbfhr_core::{ApiClient, Config, HttpAuthBackend, SessionController};

#[derive(Parser)]
#[command(name = "mbfhr", version, about = "MBF HR from the terminal")]
struct Cli {
    /// Backend base URL (overrides the config file)
    #[arg(long, global = true, env = BACKEND_URL_ENV)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show whether a session is stored and when its access token expires
    Status,
    /// Check backend health (no sign-in needed)
    Health,
    /// Show the signed-in user's profile
    Profile,
    #[command(subcommand)]
    Employees(EmployeeCommand),
    #[command(subcommand)]
    Attendance(AttendanceCommand),
    #[command(subcommand)]
    Leave(LeaveCommand),
    #[command(subcommand)]
    Payroll(PayrollCommand),
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Keep the session alive and print session changes until Ctrl+C
    Watch,
}

#[derive(Subcommand)]
enum EmployeeCommand {
    List,
    Add {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        salary: Option<f64>,
        /// YYYY-MM-DD
        #[arg(long)]
        hire_date: Option<NaiveDate>,
    },
    /// Change an employee; fields not given keep their current value
    Edit(EmployeeEdit),
}

#[derive(clap::Args)]
struct EmployeeEdit {
    id: i64,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    position: Option<String>,
    #[arg(long)]
    salary: Option<f64>,
    /// YYYY-MM-DD
    #[arg(long)]
    hire_date: Option<NaiveDate>,
}

#[derive(clap::Args)]
struct FilterArgs {
    /// YYYY-MM-DD
    #[arg(long)]
    from: Option<NaiveDate>,
    /// YYYY-MM-DD
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    status: Option<String>,
}

#[derive(Subcommand)]
enum AttendanceCommand {
    List(FilterArgs),
    Record {
        #[arg(long)]
        employee: i64,
        #[arg(long, value_enum, default_value = "present")]
        status: AttendanceArg,
        #[arg(long, default_value = "")]
        note: String,
    },
}

#[derive(Subcommand)]
enum LeaveCommand {
    List(FilterArgs),
    Request {
        #[arg(long)]
        employee: i64,
        /// YYYY-MM-DD
        #[arg(long)]
        start: NaiveDate,
        /// YYYY-MM-DD
        #[arg(long)]
        end: NaiveDate,
        #[arg(long = "type", value_enum, default_value = "annual")]
        leave_type: LeaveTypeArg,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Approve a pending request (manager/admin)
    Approve { id: i64 },
    /// Reject a pending request (manager/admin)
    Reject { id: i64 },
}

#[derive(Subcommand)]
enum PayrollCommand {
    List,
    Run {
        /// YYYY-MM-DD
        #[arg(long)]
        start: NaiveDate,
        /// YYYY-MM-DD
        #[arg(long)]
        end: NaiveDate,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Upload a new organization logo (admin)
    Logo { file: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum AttendanceArg {
    Present,
    Absent,
    Leave,
    ClockIn,
    ClockOut,
}

impl From<AttendanceArg> for AttendanceStatus {
    fn from(arg: AttendanceArg) -> Self {
        match arg {
            AttendanceArg::Present => AttendanceStatus::Present,
            AttendanceArg::Absent => AttendanceStatus::Absent,
            AttendanceArg::Leave => AttendanceStatus::Leave,
            AttendanceArg::ClockIn => AttendanceStatus::ClockIn,
            AttendanceArg::ClockOut => AttendanceStatus::ClockOut,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LeaveTypeArg {
    Annual,
    Sick,
    Unpaid,
}

impl From<LeaveTypeArg> for LeaveType {
    fn from(arg: LeaveTypeArg) -> Self {
        match arg {
            LeaveTypeArg::Annual => LeaveType::Annual,
            LeaveTypeArg::Sick => LeaveType::Sick,
            LeaveTypeArg::Unpaid => LeaveType::Unpaid,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Wire the session core and API client from config.
fn connect(config: &Config) -> Result<ApiClient> {
    let http = http_client(config.request_timeout())?;
    let backend: Arc<dyn AuthBackend> =
        Arc::new(HttpAuthBackend::new(http.clone(), &config.base_url));
    let session =
        SessionController::start(config.open_token_store()?, backend, config.session_config());
    Ok(ApiClient::new(http, &config.base_url, session))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::load()?;
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }
    info!(base_url = %config.base_url, "mbfhr starting");

    let api = connect(&config)?;
    commands::run(cli.command, &mut config, &api).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_leave_request() {
        let cli = Cli::try_parse_from([
            "mbfhr", "leave", "request", "--employee", "3", "--start", "2024-06-03", "--end",
            "2024-06-07", "--type", "sick",
        ])
        .expect("parse");
        match cli.command {
            Command::Leave(LeaveCommand::Request { employee, start, leave_type, .. }) => {
                assert_eq!(employee, 3);
                assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 3).expect("date"));
                assert_eq!(LeaveType::from(leave_type), LeaveType::Sick);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_parse_employee_edit() {
        let cli =
            Cli::try_parse_from(["mbfhr", "employees", "edit", "7", "--position", "Supervisor"])
                .expect("parse");
        match cli.command {
            Command::Employees(EmployeeCommand::Edit(edit)) => {
                assert_eq!(edit.id, 7);
                assert_eq!(edit.position.as_deref(), Some("Supervisor"));
                assert_eq!(edit.first_name, None);
                assert_eq!(edit.salary, None);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_parse_settings_logo() {
        let cli =
            Cli::try_parse_from(["mbfhr", "settings", "logo", "brand/logo.png"]).expect("parse");
        match cli.command {
            Command::Settings(SettingsCommand::Logo { file }) => {
                assert_eq!(file, PathBuf::from("brand/logo.png"));
            }
            _ => panic!("wrong command"),
        }
        assert!(Cli::try_parse_from(["mbfhr", "settings", "logo"]).is_err());
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(Cli::try_parse_from([
            "mbfhr", "payroll", "run", "--start", "03/06/2024", "--end", "2024-06-30",
        ])
        .is_err());
    }

    #[test]
    fn test_attendance_status_names() {
        let cli = Cli::try_parse_from([
            "mbfhr", "attendance", "record", "--employee", "1", "--status", "clock-in",
        ])
        .expect("parse");
        match cli.command {
            Command::Attendance(AttendanceCommand::Record { status, .. }) => {
                assert_eq!(AttendanceStatus::from(status), AttendanceStatus::ClockIn);
            }
            _ => panic!("wrong command"),
        }
    }
}
