//! Data models for HR entities.
//!
//! - `Employee`, `NewEmployee`: staff records
//! - Attendance, leave and payroll records with their request bodies
//! - `Profile`, `LogoUpload`, `HealthStatus`: account settings and server status

pub mod employee;
pub mod profile;
pub mod records;

pub use employee::{employee_label, Employee, NewEmployee};
pub use profile::{HealthStatus, LogoUpload, Profile};
pub use records::{
    AttendanceRecord, AttendanceStatus, DateFilter, LeaveRequest, LeaveStatus, LeaveType,
    NewAttendance, NewLeaveRequest, NewPayrollRun, PayrollRun,
};
