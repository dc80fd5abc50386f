//! Data models for Roost

mod account;
mod draft;
mod message;
mod status;
mod trend;
mod user;

pub use account::Account;
pub use draft::Draft;
pub use message::DirectMessage;
pub use status::{Status, UserMention};
pub use trend::{Trend, Trends};
pub use user::{Relationship, User, UserList};

/// A remote entity that is stored locally under `(account id, item id)`.
///
/// Fetched pages are generic over this trait so the same fan-out and
/// truncation code serves statuses and direct messages.
pub trait Item: Clone + Send + Sync + 'static {
    /// Remote id of the item (monotonic, newer items have larger ids)
    fn item_id(&self) -> i64;

    /// Id the source timeline pages by; `since_id` and `max_id` bounds apply to it
    fn paging_id(&self) -> i64 {
        self.item_id()
    }

    /// Tag the item with the account it was fetched for
    fn assign_account(&mut self, account_id: i64);
}
