//! Domain models for mail entities

mod mailbox;

pub use mailbox::MailboxDescriptor;
