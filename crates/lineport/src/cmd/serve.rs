use std::sync::{Arc, OnceLock};
use std::time::Duration;

use lineport_endpoint::{ConnState, EndpointConfig, LifecycleEvent, LineEndpoint};

use crate::cmd::ServeArgs;
use crate::exit::{endpoint_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_line, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = EndpointConfig {
        host: args.host,
        ..EndpointConfig::for_port(args.port)
    };

    // The hook needs the endpoint for --echo, but the endpoint is only
    // constructed with the hook in hand; the cell breaks the cycle.
    let cell: Arc<OnceLock<Arc<LineEndpoint>>> = Arc::new(OnceLock::new());

    let hook_cell = Arc::clone(&cell);
    let echo = args.echo;
    let endpoint = LineEndpoint::bind(config, move |line| {
        print_line(line, "client", format);
        if echo {
            if let Some(endpoint) = hook_cell.get() {
                endpoint.send(line);
            }
        }
    })
    .map_err(|err| endpoint_error("bind failed", err))?;

    let endpoint = Arc::new(endpoint);
    let _ = cell.set(Arc::clone(&endpoint));

    install_ctrlc_handler(Arc::clone(&endpoint))?;

    while endpoint.state() != ConnState::Terminated {
        std::thread::sleep(Duration::from_millis(100));
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(endpoint: Arc<LineEndpoint>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        endpoint.handle_lifecycle(LifecycleEvent::Stopping);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
