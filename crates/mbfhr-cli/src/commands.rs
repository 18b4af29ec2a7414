//! Command handlers.

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{debug, warn};

use mbfhr_core::auth::read_unverified_claims;
use mbfhr_core::models::{
    employee_label, DateFilter, Employee, LeaveStatus, NewAttendance, NewEmployee,
    NewLeaveRequest, NewPayrollRun,
};
use mbfhr_core::{ApiClient, ApiError, Config, Session};

use crate::format::{format_expiry, format_money, format_optional, truncate_string};
use crate::{
    AttendanceCommand, Command, EmployeeCommand, EmployeeEdit, FilterArgs, LeaveCommand,
    PayrollCommand, SettingsCommand,
};

const SIGN_IN_HINT: &str = "Not signed in or session expired. Run `mbfhr login`.";

impl From<FilterArgs> for DateFilter {
    fn from(args: FilterArgs) -> Self {
        DateFilter {
            date_from: args.from,
            date_to: args.to,
            status: args.status,
        }
    }
}

impl EmployeeEdit {
    /// Update body for `current` with the given fields replaced.
    fn apply_to(self, current: &Employee) -> NewEmployee {
        let mut update = NewEmployee::from(current);
        if let Some(first_name) = self.first_name {
            update.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            update.last_name = last_name;
        }
        update.email = self.email.or(update.email);
        update.phone = self.phone.or(update.phone);
        update.position = self.position.or(update.position);
        update.salary = self.salary.or(update.salary);
        update.hire_date = self.hire_date.or(update.hire_date);
        update
    }
}

pub async fn run(command: Command, config: &mut Config, api: &ApiClient) -> Result<()> {
    let result = match command {
        Command::Login { username } => return login(username, config, api).await,
        Command::Logout => {
            api.session().logout();
            println!("Signed out.");
            return Ok(());
        }
        Command::Status => {
            status(api);
            return Ok(());
        }
        Command::Health => {
            let health = api.health().await;
            println!(
                "Backend {}: status {}, db {}",
                config.base_url,
                health.status,
                format_optional(health.db.as_deref(), "unknown")
            );
            return Ok(());
        }
        Command::Watch => return watch(api).await,
        Command::Profile => profile(api).await,
        Command::Employees(cmd) => employees(cmd, api).await,
        Command::Attendance(cmd) => attendance(cmd, api).await,
        Command::Leave(cmd) => leave(cmd, api).await,
        Command::Payroll(cmd) => payroll(cmd, api).await,
        Command::Settings(cmd) => settings(cmd, api).await,
    };

    // Protected commands: a lost session is reported once, as a hint.
    if let Err(ref e) = result {
        let unauthorized = e
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::is_unauthorized);
        if unauthorized || !api.session().is_authenticated() {
            debug!(error = %e, "Command failed without a session");
            bail!(SIGN_IN_HINT);
        }
    }
    result
}

async fn login(username: Option<String>, config: &mut Config, api: &ApiClient) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt("Username: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", username))?;

    api.session().login(&username, &password).await?;

    config.last_username = Some(username.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    println!("Signed in as {}.", username);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;

    print!("{}", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("A username is required");
    }
    Ok(value)
}

fn status(api: &ApiClient) {
    match api.session().session() {
        Session::Anonymous => println!("Not signed in."),
        Session::Authenticated(pair) => {
            // Unverified claims: display only.
            let remaining = read_unverified_claims(&pair.access_token)
                .and_then(|claims| claims.exp)
                .map(|exp| format_expiry(exp, Utc::now().timestamp()));
            println!("Signed in.");
            println!(
                "  Access token expires: {}",
                remaining.unwrap_or_else(|| "unknown".to_string())
            );
            println!(
                "  Automatic renewal:    {}",
                if api.session().timer_armed() { "scheduled" } else { "not available" }
            );
        }
    }
}

async fn watch(api: &ApiClient) -> Result<()> {
    let session = api.session();
    let mut updates = session.subscribe();
    if !updates.borrow_and_update().is_authenticated() {
        bail!(SIGN_IN_HINT);
    }
    println!("Session active. Renewing automatically; Ctrl+C to stop.");

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                match &*updates.borrow_and_update() {
                    Session::Authenticated(_) => {
                        println!("{} session renewed", Utc::now().format("%H:%M:%S"));
                    }
                    Session::Anonymous => {
                        println!("{} session ended", Utc::now().format("%H:%M:%S"));
                        bail!(SIGN_IN_HINT);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                return Ok(());
            }
        }
    }
}

async fn profile(api: &ApiClient) -> Result<()> {
    let profile = api.fetch_profile().await?;
    println!("User:     {}", format_optional(profile.username.as_deref(), "-"));
    println!("Role:     {}", profile.role());
    println!("Currency: {}", profile.currency());
    println!("Logo:     {}", format_optional(profile.logo_url.as_deref(), "-"));
    if profile.can_approve_leave() {
        println!("May approve leave requests.");
    }
    Ok(())
}

async fn employees(cmd: EmployeeCommand, api: &ApiClient) -> Result<()> {
    match cmd {
        EmployeeCommand::List => {
            let currency = currency(api).await;
            let employees = api.fetch_employees().await?;
            println!(
                "{:>5}  {:<28} {:<20} {:>16}  {}",
                "ID", "NAME", "POSITION", "SALARY", "HIRED"
            );
            for e in &employees {
                println!(
                    "{:>5}  {:<28} {:<20} {:>16}  {}",
                    e.id,
                    truncate_string(&e.full_name(), 28),
                    truncate_string(&format_optional(e.position.as_deref(), "-"), 20),
                    format_money(e.salary, &currency),
                    e.hire_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
                );
            }
            if employees.is_empty() {
                println!("No employees yet.");
            }
        }
        EmployeeCommand::Add {
            first_name,
            last_name,
            email,
            phone,
            position,
            salary,
            hire_date,
        } => {
            let created = api
                .create_employee(&NewEmployee {
                    first_name,
                    last_name,
                    email,
                    phone,
                    position,
                    salary,
                    hire_date,
                })
                .await?;
            println!("Added employee #{} {}.", created.id, created.full_name());
        }
        EmployeeCommand::Edit(edit) => {
            let employees = api.fetch_employees().await?;
            let Some(current) = employees.iter().find(|e| e.id == edit.id) else {
                bail!("Employee #{} not found", edit.id);
            };
            let id = edit.id;
            let update = edit.apply_to(current);
            let updated = api.update_employee(id, &update).await?;
            println!("Updated employee #{} {}.", updated.id, updated.full_name());
        }
    }
    Ok(())
}

async fn attendance(cmd: AttendanceCommand, api: &ApiClient) -> Result<()> {
    match cmd {
        AttendanceCommand::List(filter) => {
            let records = api.fetch_attendance(&filter.into()).await?;
            let employees = api.fetch_employees().await.unwrap_or_default();
            println!("{:<22} {:<28} {:<10} {}", "TIME", "EMPLOYEE", "STATUS", "NOTE");
            for r in &records {
                println!(
                    "{:<22} {:<28} {:<10} {}",
                    format_optional(r.ts.as_deref(), "-"),
                    truncate_string(&employee_label(&employees, r.employee_id), 28),
                    format_optional(r.status.as_deref(), "-"),
                    format_optional(r.note.as_deref(), "-"),
                );
            }
            if records.is_empty() {
                println!("No attendance records.");
            }
        }
        AttendanceCommand::Record { employee, status, note } => {
            let record = api
                .record_attendance(&NewAttendance {
                    employee_id: employee,
                    status: status.into(),
                    note,
                })
                .await?;
            println!("Recorded attendance #{}.", record.id);
        }
    }
    Ok(())
}

async fn leave(cmd: LeaveCommand, api: &ApiClient) -> Result<()> {
    match cmd {
        LeaveCommand::List(filter) => {
            let requests = api.fetch_leave(&filter.into()).await?;
            let employees = api.fetch_employees().await.unwrap_or_default();
            println!(
                "{:>5}  {:<28} {:<23} {:>4}  {:<8} {}",
                "ID", "EMPLOYEE", "DATES", "DAYS", "TYPE", "STATUS"
            );
            for r in &requests {
                println!(
                    "{:>5}  {:<28} {:<23} {:>4}  {:<8} {}",
                    r.id,
                    truncate_string(&employee_label(&employees, r.employee_id), 28),
                    format!("{} - {}", r.start_date, r.end_date),
                    r.days(),
                    r.leave_type,
                    r.status,
                );
            }
            if requests.is_empty() {
                println!("No leave requests.");
            }
        }
        LeaveCommand::Request { employee, start, end, leave_type, reason } => {
            let created = api
                .request_leave(&NewLeaveRequest {
                    employee_id: employee,
                    start_date: start,
                    end_date: end,
                    leave_type: leave_type.into(),
                    reason,
                })
                .await?;
            println!("Submitted leave request #{} ({} days).", created.id, created.days());
        }
        LeaveCommand::Approve { id } => set_leave_status(api, id, LeaveStatus::Approved).await?,
        LeaveCommand::Reject { id } => set_leave_status(api, id, LeaveStatus::Rejected).await?,
    }
    Ok(())
}

async fn set_leave_status(api: &ApiClient, id: i64, status: LeaveStatus) -> Result<()> {
    match api.set_leave_status(id, status).await {
        Ok(()) => {
            println!("Leave request #{} {}.", id, status.as_str());
            Ok(())
        }
        Err(e) if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::AccessDenied(_))) => {
            bail!("You do not have permission to approve/reject")
        }
        Err(e) => Err(e),
    }
}

async fn payroll(cmd: PayrollCommand, api: &ApiClient) -> Result<()> {
    match cmd {
        PayrollCommand::List => {
            let currency = currency(api).await;
            let runs = api.fetch_payroll_runs().await?;
            println!("{:>5}  {:<23} {:>18}  {}", "ID", "PERIOD", "TOTAL", "CREATED");
            for run in &runs {
                println!(
                    "{:>5}  {:<23} {:>18}  {}",
                    run.id,
                    format!("{} - {}", run.period_start, run.period_end),
                    format_money(run.total_amount, &currency),
                    format_optional(run.created_at.as_deref(), "-"),
                );
            }
            if runs.is_empty() {
                println!("No payroll runs yet.");
            }
        }
        PayrollCommand::Run { start, end } => {
            if end < start {
                bail!("Period end is before period start");
            }
            let run = api
                .create_payroll_run(&NewPayrollRun {
                    period_start: start,
                    period_end: end,
                })
                .await?;
            println!("Created payroll run #{}.", run.id);
        }
    }
    Ok(())
}

async fn settings(cmd: SettingsCommand, api: &ApiClient) -> Result<()> {
    match cmd {
        SettingsCommand::Logo { file } => match api.upload_logo(&file).await {
            Ok(url) => println!("Logo updated: {}", url),
            Err(e) if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::AccessDenied(_))) => {
                bail!("You do not have permission to change the logo")
            }
            Err(e) => return Err(e),
        },
    }
    Ok(())
}

/// Organization currency from the profile, or the default when it cannot be
/// fetched.
async fn currency(api: &ApiClient) -> String {
    match api.fetch_profile().await {
        Ok(profile) => profile.currency().to_string(),
        Err(e) => {
            debug!(error = %e, "Profile unavailable, using default currency");
            mbfhr_core::models::Profile::default().currency().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn employee() -> Employee {
        Employee {
            id: 3,
            first_name: "Losa".into(),
            last_name: "Kata".into(),
            email: Some("losa@mbf.to".into()),
            phone: None,
            position: Some("Clerk".into()),
            salary: Some(4200.0),
            hire_date: NaiveDate::from_ymd_opt(2021, 2, 15),
        }
    }

    fn edit() -> EmployeeEdit {
        EmployeeEdit {
            id: 3,
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
            position: None,
            salary: None,
            hire_date: None,
        }
    }

    #[test]
    fn test_edit_replaces_only_given_fields() {
        let update = EmployeeEdit {
            position: Some("Supervisor".into()),
            salary: Some(5100.0),
            ..edit()
        }
        .apply_to(&employee());

        assert_eq!(update.first_name, "Losa");
        assert_eq!(update.email.as_deref(), Some("losa@mbf.to"));
        assert_eq!(update.position.as_deref(), Some("Supervisor"));
        assert_eq!(update.salary, Some(5100.0));
        assert_eq!(update.hire_date, NaiveDate::from_ymd_opt(2021, 2, 15));
    }

    #[test]
    fn test_empty_edit_resends_current_record() {
        let update = edit().apply_to(&employee());
        assert_eq!(update.last_name, "Kata");
        assert_eq!(update.phone, None);
        assert_eq!(update.position.as_deref(), Some("Clerk"));
        assert_eq!(update.salary, Some(4200.0));
    }
}
