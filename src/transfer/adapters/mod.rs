//! Adapters module - network node and key holder implementations

pub mod traits;
pub mod mock;
pub mod rpc;
pub mod keypair;

pub use traits::{NetworkClient, WalletSigner};
pub use mock::{ConfirmBehavior, MemoryRecordStore, MockNetwork, MockSigner, SignBehavior};

// JSON-RPC node client
pub use rpc::RpcNetworkClient;

// Local ed25519 keypair
pub use keypair::KeypairSigner;
