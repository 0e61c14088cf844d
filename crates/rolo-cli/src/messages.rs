//! Strings shown to the user after an operation.

use rolo_core::{Error, contact::Contact};

pub const DELETED: &str = "Contact deleted successfully!";

pub const CREATE_FAILED: &str = "Failed to create contact";
pub const UPDATE_FAILED: &str = "Failed to update contact";
pub const DELETE_FAILED: &str = "Failed to delete contact";
pub const FETCH_FAILED: &str = "Failed to load contacts";
pub const EMAIL_EXISTS: &str = "A contact with this email already exists";
pub const CONTACT_NOT_FOUND: &str = "Contact not found";

pub const NO_PHONE: &str = "No phone";
pub const NO_COMPANY: &str = "No company";
pub const NO_CONTACTS: &str = "No contacts yet";

pub fn created(contact: &Contact) -> String {
  format!("Contact {} created successfully!", contact.full_name())
}

pub fn updated(contact: &Contact) -> String {
  format!("Contact {} updated successfully!", contact.full_name())
}

pub fn empty_search(search: &str) -> String {
  format!("No contacts match \"{search}\". Try a different search term.")
}

/// What the user was trying to do when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Create,
  Update,
  Delete,
  Fetch,
}

impl Operation {
  fn failed(self) -> &'static str {
    match self {
      Self::Create => CREATE_FAILED,
      Self::Update => UPDATE_FAILED,
      Self::Delete => DELETE_FAILED,
      Self::Fetch => FETCH_FAILED,
    }
  }
}

/// The message for `error` raised during `op`.
///
/// Validation errors carry their own field messages; backend and transport
/// failures collapse to the generic failure for the operation.
pub fn failure(op: Operation, error: &Error) -> String {
  match error {
    Error::Validation(message) => message.clone(),
    Error::DuplicateEmail(_) => EMAIL_EXISTS.to_string(),
    Error::ContactNotFound(_) => CONTACT_NOT_FOUND.to_string(),
    Error::Backend(_) | Error::Transport(_) => op.failed().to_string(),
  }
}
