/*!
# FleetLink DevKit - stubs and helpers for testing

Lets the client core be exercised without a node on the network:
- Scripted transport whose connection attempts succeed or fail on demand
- Fake fleet and release sources with call counters
- Builders for node payloads (`/api/info`, `/api/peers`, releases, push messages)
- Small async helpers for waiting on the driver tasks
*/

pub mod fixtures;
pub mod sources;
pub mod test_utils;
pub mod transport_stub;

pub use fixtures::{FleetFixtures, NodeMessageBuilder};
pub use sources::{MockFleetSource, MockReleaseSource};
pub use test_utils::{init_logging, settle, wait_until};
pub use transport_stub::{MockChannel, MockTransport, OpenOutcome};
