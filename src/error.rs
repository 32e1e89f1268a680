use std::io;

quick_error! {
    #[derive(Debug)]
    pub enum CrowdError {
        Io(err: io::Error) {
            from()
            description("I/O error")
            display("I/O error: {}", err)
            cause(err)
        }
        Csv(err: csv::Error) {
            from()
            description("CSV error")
            display("CSV error: {}", err)
            cause(err)
        }
        Json(err: serde_json::Error) {
            from()
            description("JSON error")
            display("JSON error: {}", err)
            cause(err)
        }
        Distribution(err: statrs::StatsError) {
            from()
            description("Invalid distribution parameters")
            display("Invalid distribution parameters: {}", err)
            cause(err)
        }
        InvalidSetting(name: &'static str, reason: String) {
            description("Invalid setting")
            display("Invalid setting `{}`: {}", name, reason)
        }
        UnknownApplication(name: String) {
            description("Unknown application")
            display("`application` cannot be {}", name)
        }
        UnknownDataset(name: String) {
            description("Unknown crowd dataset")
            display("{} is not an understood crowd dataset", name)
        }
        ShapeMismatch(what: &'static str, expected: usize, actual: usize) {
            description("Shape mismatch")
            display("Shape mismatch for {}: expected {}, got {}", what, expected, actual)
        }
        EmptyDataset {
            description("Dataset contains no examples")
        }
        SourceDisconnected(stream: &'static str) {
            description("Data source disconnected")
            display("Data source for {} batches disconnected", stream)
        }
    }
}

pub type Result<T> = std::result::Result<T, CrowdError>;
