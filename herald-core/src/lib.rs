//! Herald Core - review request tracking for chat workspaces
//!
//! This crate holds the review-status state machine, the notification
//! resolver, the reminder sweep and the weekly report, plus the traits the
//! storage and chat adapters implement.

pub mod config;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod request;
pub mod secrets;
pub mod store;
pub mod workflow;

pub use config::Config;
pub use error::{Error, FieldError, Result, ValidationErrors};
pub use gateway::{FormView, IdentityResolver, MessageContent, NotificationGateway, PostedMessage};
pub use notify::{Notification, NotificationIntent, Reminder, ReminderKind};
pub use request::{
    ChangeKind, MessageHandle, NewReviewRequest, Priority, PublishedMessage, RequestEdit,
    RequestId, ReviewRequest, ReviewStatus, Reviewer, User,
};
pub use secrets::Secrets;
pub use store::{AggregateUpdate, InMemoryRepository, RequestRepository};
pub use workflow::{DeskSettings, ReviewDesk};
