//! Entity module - SeaORM entity definitions
//!
//! One module per table. Tenant-owned tables carry `company_id` plus the
//! audit stamp columns and implement [`crate::scope::Tenanted`] through
//! `tenanted!()`.

/// Implements `Tenanted` for the `Entity` of the module it is invoked in.
macro_rules! tenanted {
    () => {
        impl crate::scope::Tenanted for Entity {
            fn id_column() -> Column {
                Column::Id
            }

            fn company_column() -> Column {
                Column::CompanyId
            }

            fn deleted_at_column() -> Column {
                Column::DeletedAt
            }

            fn deleted_by_column() -> Column {
                Column::DeletedBy
            }

            fn updated_at_column() -> Column {
                Column::UpdatedAt
            }

            fn updated_by_column() -> Column {
                Column::UpdatedBy
            }
        }
    };
}

pub mod attendance;
pub mod branch;
pub mod casbin_rule;
pub mod city;
pub mod company;
pub mod department;
pub mod employee;
pub mod item;
pub mod leave_request;
pub mod op_log;
pub mod partner;
pub mod payroll_data;
pub mod payroll_record;
pub mod project;
pub mod purchase;
pub mod purchase_line;
pub mod region;
pub mod sale;
pub mod sale_line;
pub mod stock_balance;
pub mod stock_movement;
pub mod user;
pub mod warehouse;
