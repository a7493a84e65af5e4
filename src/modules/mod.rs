// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod blob;
pub mod cache;
pub mod common;
pub mod context;
pub mod database;
pub mod dkim;
pub mod domain;
pub mod draft;
pub mod error;
pub mod inbound;
pub mod index;
pub mod label;
pub mod logger;
pub mod mailbox;
pub mod message;
pub mod mime;
pub mod outbound;
pub mod scheduler;
pub mod settings;
pub mod spam;
pub mod tasks;
pub mod template;
pub mod thread;
pub mod transport;
pub mod utils;
