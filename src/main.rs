/*!
 * Job Control Kernel - Driver
 *
 * Runs the kernel over a loopback backend and speaks JSON lines:
 * - stdin: host requests (`{"op": ...}`) or backend events (`{"event": ...}`)
 * - stdout: `{"request": n, "response": ...}` replies and host events
 *
 * Ctrl+C is delivered to the foreground process as an interrupt.
 */

use anyhow::Context;
use jobctl_kernel::api::serve;
use jobctl_kernel::core::limits::LOOPBACK_HISTORY;
use jobctl_kernel::{
    init_tracing, FsManifestSource, HeadlessPresenter, Kernel, KernelConfig, KernelError,
    LocalPipeServer, LoopbackBackend, ManifestResolver, ProcessManager,
};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Job control kernel starting...");

    let config = match std::env::args().nth(1) {
        Some(path) => KernelConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => KernelConfig::from_env(),
    };
    info!(
        manifest_root = %config.manifest_root.display(),
        whitelist = config.whitelist.as_ref().map(Vec::len),
        "Configuration loaded"
    );

    let source = Arc::new(FsManifestSource::new(config.manifest_root.clone()));
    let resolver = ManifestResolver::from_config(source, &config);
    let (listener, events) = Kernel::listener();
    let backend = LoopbackBackend::bounded(LOOPBACK_HISTORY);
    let manager = ProcessManager::builder(backend, HeadlessPresenter::new())
        .with_listener(listener)
        .with_config(config)
        .build();
    let (kernel, handle) = Kernel::new(manager, resolver, Arc::new(LocalPipeServer::new()));
    let kernel_task = kernel.start();

    let interrupts = handle.clone();
    let interrupter = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match interrupts.interrupt().await {
                Ok(handled) => info!(handled, "Interrupt delivered"),
                Err(KernelError::NoForeground) => info!("Interrupt with no foreground process"),
                Err(e) => {
                    warn!(error = %e, "Interrupt failed");
                    break;
                }
            }
        }
    });

    info!("Kernel ready, reading requests from stdin");

    let input = BufReader::new(tokio::io::stdin());
    let served = serve(handle, events, input, tokio::io::stdout()).await;

    interrupter.abort();
    let _ = interrupter.await;
    // Every handle is gone now; the loop drains and stops
    if let Err(e) = kernel_task.await {
        error!(error = %e, "Kernel task failed");
    }
    served.context("serving stdin")?;
    info!("Job control kernel stopped");
    Ok(())
}
