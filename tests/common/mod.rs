#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use planetarypy::config::Config;

/// Label of a small CTX EDR cumulative index.
pub const CTX_LABEL: &str = r#"PDS_VERSION_ID = PDS3
RECORD_TYPE    = FIXED_LENGTH
RECORD_BYTES   = 108
^INDEX_TABLE   = "CUMINDEX.TAB"
OBJECT         = INDEX_TABLE
  INTERCHANGE_FORMAT = ASCII
  ROWS               = 3
  COLUMNS            = 6
  OBJECT     = COLUMN
    NAME       = VOLUME_ID
    DATA_TYPE  = CHARACTER
    START_BYTE = 2
    BYTES      = 9
  END_OBJECT = COLUMN
  OBJECT     = COLUMN
    NAME       = PRODUCT_ID
    DATA_TYPE  = CHARACTER
    START_BYTE = 14
    BYTES      = 26
  END_OBJECT = COLUMN
  OBJECT     = COLUMN
    NAME       = IMAGE_TIME
    DATA_TYPE  = TIME
    START_BYTE = 42
    BYTES      = 23
  END_OBJECT = COLUMN
  OBJECT     = COLUMN
    NAME       = LINE_SAMPLES
    DATA_TYPE  = ASCII_INTEGER
    START_BYTE = 66
    BYTES      = 4
  END_OBJECT = COLUMN
  OBJECT     = COLUMN
    NAME       = SPATIAL_SUMMING
    DATA_TYPE  = ASCII_INTEGER
    START_BYTE = 71
    BYTES      = 1
  END_OBJECT = COLUMN
  OBJECT     = COLUMN
    NAME       = DATA_QUALITY_DESC
    DATA_TYPE  = CHARACTER
    START_BYTE = 74
    BYTES      = 5
  END_OBJECT = COLUMN
END_OBJECT     = INDEX_TABLE
END
"#;

pub const CTX_PIDS: [&str; 3] = [
    "P01_001472_1747_XI_05S146W",
    "P01_001473_1901_XI_10N126W",
    "P02_001920_1830_XI_03N104W",
];

/// Rows matching [`CTX_LABEL`], CRLF terminated.
pub fn ctx_table() -> String {
    [
        ("MROX_0001", CTX_PIDS[0], "2006-11-08T04:49:13.952", 5056, 1, "OK   "),
        ("MROX_0001", CTX_PIDS[1], "2006-11-08T07:11:42.118", 2528, 2, "ERROR"),
        ("MROX_0002", CTX_PIDS[2], "2006-12-14T01:02:03.000", 5056, 1, "OK   "),
    ]
    .iter()
    .map(|(vol, pid, time, samples, summing, quality)| {
        format!("\"{vol}\",\"{pid}\",{time},{samples},{summing},\"{quality}\"\r\n")
    })
    .collect()
}

/// Scratch storage: a temporary directory with a configuration file in it.
pub struct Scratch {
    _dir: tempfile::TempDir,
    pub root: Utf8PathBuf,
}

impl Scratch {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        Scratch { _dir: dir, root }
    }

    pub fn storage(&self) -> Utf8PathBuf {
        self.root.join("storage")
    }

    pub fn config_path(&self) -> Utf8PathBuf {
        self.root.join("config.toml")
    }

    /// Configuration with `storage_root` set, followed by `extra` TOML.
    pub fn config(&self, extra: &str) -> Config {
        let text = format!("storage_root = \"{}\"\n\n{extra}", self.storage());
        std::fs::write(self.config_path(), &text).unwrap();
        Config::load(&self.config_path()).unwrap()
    }

    /// Put the CTX EDR index where the index manager expects it.
    pub fn place_ctx_index(&self) -> Utf8PathBuf {
        let dir = self.storage().join("mro/ctx/indexes/edr");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("CUMINDEX.LBL"), CTX_LABEL).unwrap();
        std::fs::write(dir.join("CUMINDEX.TAB"), ctx_table()).unwrap();
        dir
    }
}

pub fn write_file(path: &Utf8Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// A minimal HTTP server answering `HEAD` and `GET` for a fixed set of files.
///
/// Every response carries the current `Last-Modified` value and closes the connection.
pub struct HttpFixture {
    pub base_url: String,
    last_modified: Arc<Mutex<String>>,
    head_requests: Arc<AtomicUsize>,
    get_requests: Arc<AtomicUsize>,
}

impl HttpFixture {
    pub fn start(files: &[(&str, &[u8])], last_modified: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let files: Arc<HashMap<String, Vec<u8>>> = Arc::new(
            files
                .iter()
                .map(|(path, body)| (path.to_string(), body.to_vec()))
                .collect(),
        );
        let last_modified = Arc::new(Mutex::new(last_modified.to_string()));
        let head_requests = Arc::new(AtomicUsize::new(0));
        let get_requests = Arc::new(AtomicUsize::new(0));

        let (lm, heads, gets) = (
            last_modified.clone(),
            head_requests.clone(),
            get_requests.clone(),
        );
        std::thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let _ = serve_one(stream, &files, &lm, &heads, &gets);
            }
        });

        HttpFixture {
            base_url,
            last_modified,
            head_requests,
            get_requests,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn set_last_modified(&self, value: &str) {
        *self.last_modified.lock().unwrap() = value.to_string();
    }

    pub fn head_requests(&self) -> usize {
        self.head_requests.load(Ordering::SeqCst)
    }

    pub fn get_requests(&self) -> usize {
        self.get_requests.load(Ordering::SeqCst)
    }
}

fn serve_one(
    stream: TcpStream,
    files: &HashMap<String, Vec<u8>>,
    last_modified: &Mutex<String>,
    heads: &AtomicUsize,
    gets: &AtomicUsize,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    match method.as_str() {
        "HEAD" => heads.fetch_add(1, Ordering::SeqCst),
        _ => gets.fetch_add(1, Ordering::SeqCst),
    };

    let mut stream = stream;
    match files.get(&path) {
        Some(body) => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nLast-Modified: {}\r\nConnection: close\r\n\r\n",
                body.len(),
                last_modified.lock().unwrap()
            );
            stream.write_all(head.as_bytes())?;
            if method != "HEAD" {
                stream.write_all(body)?;
            }
        }
        None => {
            stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            )?;
        }
    }
    stream.flush()
}
