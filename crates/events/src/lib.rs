//! Domain events and the in-process bus that distributes them.

pub mod banking;
pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use banking::{AccountOpened, BalanceChanged, BankingEvent};
pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
