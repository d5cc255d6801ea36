mod handler;
mod model;


pub use handler::{
    attendance_batch, attendance_one, configure, export_one, link_team, list_events, list_groups,
    remove_configuration, status, test_connection, trigger_sync, unlink_one, unlink_team,
    update_one, validate_export,
};
