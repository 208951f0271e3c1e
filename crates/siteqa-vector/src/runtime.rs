//! The tokio runtime the dense store drives lance with.
//!
//! Callers are synchronous, but they may themselves run on a tokio worker
//! (an async request handler calling the retriever). On a multi-thread
//! runtime the blocking call is moved off the worker with `block_in_place`;
//! a current-thread runtime cannot give up its only thread, so the call
//! fails instead of panicking.
use std::future::Future;

use anyhow::{anyhow, Context, Result};
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

pub(crate) struct LanceRuntime {
	inner: Option<Runtime>,
}

impl LanceRuntime {
	pub(crate) fn new() -> Result<Self> {
		let runtime = Builder::new_multi_thread()
			.worker_threads(2)
			.thread_name("siteqa-lance")
			.enable_all()
			.build()
			.context("starting lance runtime")?;
		Ok(Self { inner: Some(runtime) })
	}

	/// Run `fut` to completion from synchronous code.
	pub(crate) fn block_on<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
		let runtime = self.inner.as_ref().ok_or_else(|| anyhow!("lance runtime already shut down"))?;
		match Handle::try_current() {
			Err(_) => runtime.block_on(fut),
			Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
				tokio::task::block_in_place(|| runtime.block_on(fut))
			}
			Ok(_) => Err(anyhow!("dense index cannot block inside a current-thread tokio runtime")),
		}
	}
}

impl Drop for LanceRuntime {
	// Dropping a runtime blocks, which tokio forbids inside an async context.
	fn drop(&mut self) {
		if let Some(runtime) = self.inner.take() {
			runtime.shutdown_background();
		}
	}
}
