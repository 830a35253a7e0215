//! Shared helpers for ecb integration tests.

pub mod logging;

use ecb_common::store::FileStore;
use ecbd::loopback::LoopbackHost;
use ecbd::{Dispatcher, HostProbe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tempfile::TempDir;

/// A loopback host ticking in a background thread, the way a real editor
/// would tick the dispatcher from its frame loop.
pub struct TickingHost {
    _tmp: TempDir,
    pub store: FileStore,
    pub host: LoopbackHost,
    stop: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
}

impl TickingHost {
    pub fn start() -> Self {
        logging::init_test_logging();
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join(".editor-bridge"));
        store.ensure_dir().unwrap();

        let host = LoopbackHost::new();
        let dispatcher = Dispatcher::new(
            store.clone(),
            host.registry(),
            host.probe() as Arc<dyn HostProbe>,
        );
        dispatcher.startup_sweep(Duration::from_secs(3600));

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let ticker = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::SeqCst) {
                dispatcher.tick();
                std::thread::sleep(Duration::from_millis(10));
            }
        });

        Self {
            _tmp: tmp,
            store,
            host,
            stop,
            ticker: Some(ticker),
        }
    }
}

impl Drop for TickingHost {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }
    }
}
