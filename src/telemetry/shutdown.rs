/// Registers a ctrl-c handler that requests a graceful shutdown by
/// flipping `shutdown_flag` rather than exiting immediately, so in-flight
/// `stop(graceful=true)` polling (spec §4.E) has a chance to complete.
pub fn register_shutdown(shutdown_flag: std::sync::Arc<std::sync::atomic::AtomicBool>) {
    ctrlc::set_handler(move || {
        println!();
        tracing::info!("shutdown requested, stopping gracefully...");
        shutdown_flag.store(true, std::sync::atomic::Ordering::SeqCst);
    })
    .expect("failed to register shutdown handler");
}
