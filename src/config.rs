use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// Idle seconds before a client is disconnected. 0 disables the timeout.
    pub timeout: u64,
    /// Expiration sweeps per second.
    pub hz: u64,
    pub loglevel: String,
    // Backing store
    pub dbfilename: String,
    pub dir: String,
    /// Milliseconds to wait on a database locked by another process.
    pub busy_timeout: u64,
    /// Most expired records removed per sweep.
    pub expire_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1".to_string(),
            port: 6379,
            timeout: 0,
            hz: 10,
            loglevel: "notice".to_string(),
            dbfilename: "relis.db".to_string(),
            dir: ".".to_string(),
            busy_timeout: 5000,
            expire_batch: 1000,
        }
    }
}

impl Config {
    /// Build a config from `--name value` pairs. Unknown flags and
    /// unparsable values are ignored.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = Config::default();
        let mut i = 0;
        while i < args.len() {
            let Some(value) = args.get(i + 1) else {
                break;
            };
            match args[i].as_str() {
                "--bind" => config.bind = value.clone(),
                "--port" => set_parsed(&mut config.port, value),
                "--timeout" => set_parsed(&mut config.timeout, value),
                "--hz" => set_parsed(&mut config.hz, value),
                "--loglevel" => config.loglevel = value.clone(),
                "--dbfilename" => config.dbfilename = value.clone(),
                "--dir" => config.dir = value.clone(),
                "--busy-timeout" => set_parsed(&mut config.busy_timeout, value),
                "--expire-batch" => set_parsed(&mut config.expire_batch, value),
                _ => {
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }
        config
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Database file location. `:memory:` keeps everything in memory.
    pub fn db_path(&self) -> String {
        if self.dbfilename == ":memory:" {
            return self.dbfilename.clone();
        }
        PathBuf::from(&self.dir)
            .join(&self.dbfilename)
            .to_string_lossy()
            .into_owned()
    }

    pub fn client_timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.hz.clamp(1, 500))
    }

    /// Translate a Redis log level into a tracing filter directive.
    pub fn log_filter(&self) -> &str {
        match self.loglevel.as_str() {
            "debug" | "verbose" => "debug",
            "notice" => "info",
            "warning" => "warn",
            other => other,
        }
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: &str) {
    if let Ok(v) = value.parse() {
        *slot = v;
    }
}
