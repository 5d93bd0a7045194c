use std::sync::Arc;
use std::time::SystemTime;

use modwire::*;

// Define regular traits and implementor structs

trait Logger: Send + Sync {
    fn log(&self, content: &str);
}

trait DateLogger: Send + Sync {
    fn log_date(&self);
}

#[derive(Default)]
struct LoggerImpl;

impl Logger for LoggerImpl {
    fn log(&self, content: &str) {
        println!("{}", content);
    }
}

struct DateLoggerImpl {
    logger: Arc<dyn Logger>,
}

impl DateLogger for DateLoggerImpl {
    fn log_date(&self) {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap();
        self.logger.log(&format!("{}s since epoch", now.as_secs()));
    }
}

// Trait objects are stored behind a sized handle to be downcast from the container
type SharedLogger = Arc<dyn Logger>;
type SharedDateLogger = Arc<dyn DateLogger>;

fn main() -> Result<(), WiringError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let modules = Registrar::with_config(RegistrarConfig::default().with_trace_resolution(true));

    // A library module with the logging services
    let logging = modules.module("logging");
    logging.service(
        "logger",
        Constructor::new(inject!(|| {
            let logger: SharedLogger = Arc::new(LoggerImpl);
            instance(logger)
        })),
    )?;
    logging.service(
        "date_logger",
        Constructor::new(inject!(|logger: SharedLogger| {
            let date_logger: SharedDateLogger = Arc::new(DateLoggerImpl {
                logger: (*logger).clone(),
            });
            instance(date_logger)
        })),
    )?;
    logging.config(inject!(|logger: SharedLogger| logger.log("logging configured")));

    // The app only declares what it uses
    let app = modules.app("demo");
    app.uses(["logging"]);
    app.on_start(inject!(|date_logger: SharedDateLogger| date_logger.log_date()))?;
    app.start()?;

    println!("{:?}", modules);
    Ok(())
}
