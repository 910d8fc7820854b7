//! Postgres repositories, one per table.

pub mod history;
pub mod job;
pub mod payment;
pub mod session;
pub mod usage;
pub mod user;
pub mod vendor_key;

pub use history::HistoryRepository;
pub use job::GenerationJobRepository;
pub use payment::PaymentRepository;
pub use session::SessionRepository;
pub use usage::UsageRepository;
pub use user::UserRepository;
pub use vendor_key::VendorKeyRepository;
