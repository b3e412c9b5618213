mod admin;
mod approvals;
mod folders;
mod requests;

pub use admin::{admin_purge, health, pending_notifications};
pub use approvals::{complete_request, decline_approval, list_approvals, list_completed};
pub use folders::{delete_entry, list_folder, upload_entry};
pub use requests::{
    delete_request, forward_request, get_request, list_requests, list_student_requests,
    submit_request, update_request,
};
