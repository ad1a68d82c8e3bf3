//! A client for the Copernicus Climate Data Store (CDS) retrieve API.
//!
//! A retrieval is a single request: the request is submitted as a job, the job
//! is polled until the CDS finishes or rejects it, and the result file is then
//! streamed to disk. Nothing is retried; any error ends the retrieval.
//!
//! Credentials follow the conventions of the official `cdsapi` Python client:
//! the `CDSAPI_URL` and `CDSAPI_KEY` environment variables take precedence over
//! the `url:` and `key:` lines of `~/.cdsapirc` (whose location may be changed
//! with `CDSAPI_RC`).
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CDS_URL: &str = "https://cds.climate.copernicus.eu/api";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(3 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum CdsError {
    #[error("No CDS API credentials found: set CDSAPI_URL and CDSAPI_KEY or create {}", .0.display())]
    NoCredentials(PathBuf),
    #[error("Could not read CDS API configuration file {}", .path.display())]
    ReadRc {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CDS API configuration file {} has no '{key}:' line", .path.display())]
    IncompleteRc { path: PathBuf, key: &'static str },
    #[error("Could not read request file {}", .path.display())]
    ReadRequest {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not parse request file {}", .path.display())]
    ParseRequest {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Could not write request template to {}", .path.display())]
    WriteTemplate {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("HTTP request to {url} failed")]
    Http { url: String, source: reqwest::Error },
    #[error("The CDS API returned HTTP {status} for {url}: {body}")]
    Service {
        url: String,
        status: u16,
        body: String,
    },
    #[error("CDS job {job_id} ended with status '{status}'{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    JobFailed {
        job_id: String,
        status: JobState,
        detail: Option<String>,
    },
    #[error("CDS job {job_id} did not finish within {} s", .waited.as_secs())]
    Timeout { job_id: String, waited: Duration },
    #[error("The results of CDS job {job_id} did not include a download URL")]
    NoDownloadUrl { job_id: String },
    #[error("Could not write the download to {}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Download from {url} ended after {received} of {expected} bytes")]
    Truncated {
        url: String,
        expected: u64,
        received: u64,
    },
    #[error("Download failed - file '{}' was not created!", .0.display())]
    MissingOutput(PathBuf),
    #[error("Download failed - file '{}' is empty!", .0.display())]
    EmptyOutput(PathBuf),
}

impl CdsError {
    fn http(url: &str, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.to_string(),
            source,
        }
    }
}

// ------------- //
// Request types //
// ------------- //

/// A dataset retrieval: what to ask the CDS for and where to save it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveRequest {
    /// CDS dataset identifier, e.g. `reanalysis-era5-single-levels`
    pub dataset: String,
    /// Local file to write the result to
    pub output: PathBuf,
    /// The request body sent to the CDS
    pub inputs: RequestInputs,
}

/// Selection of variables, dates, times, and region to retrieve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInputs {
    pub product_type: Vec<String>,
    pub variable: Vec<String>,
    pub year: Vec<String>,
    pub month: Vec<String>,
    pub day: Vec<String>,
    pub time: Vec<String>,
    pub data_format: String,
    pub download_format: String,
    /// Bounding box as north, west, south, east in degrees
    pub area: [f64; 4],
}

fn strings<S: ToString>(items: impl IntoIterator<Item = S>) -> Vec<String> {
    items.into_iter().map(|s| s.to_string()).collect()
}

impl Default for RetrieveRequest {
    /// ERA5 2 m temperature over Europe, 6-hourly for 1-16 January 2026
    fn default() -> Self {
        Self {
            dataset: "reanalysis-era5-single-levels".to_string(),
            output: PathBuf::from("era5_data.nc"),
            inputs: RequestInputs {
                product_type: strings(["reanalysis"]),
                variable: strings(["2m_temperature"]),
                year: strings(["2026"]),
                month: strings(["01"]),
                day: (1..=16).map(|d| format!("{d:02}")).collect(),
                time: strings(["00:00", "06:00", "12:00", "18:00"]),
                data_format: "netcdf".to_string(),
                download_format: "unarchived".to_string(),
                area: [75.0, -25.0, 30.0, 45.0],
            },
        }
    }
}

impl RetrieveRequest {
    pub fn from_toml_file(path: &Path) -> Result<Self, CdsError> {
        let s = std::fs::read_to_string(path).map_err(|source| CdsError::ReadRequest {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&s).map_err(|source| CdsError::ParseRequest {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the default request, with explanatory comments, to `path`.
    pub fn write_template(path: &Path) -> Result<(), CdsError> {
        let comments = [
            "Request for download_era5. 'dataset' is the CDS dataset identifier and",
            "'output' the file to write. The [inputs] table is sent to the CDS as-is;",
            "see the dataset's download form on the CDS website for the allowed values.",
            "'area' is the bounding box as [north, west, south, east] in degrees.",
        ];

        let to_io_err = |source| CdsError::WriteTemplate {
            path: path.to_path_buf(),
            source,
        };
        let mut f = File::create(path).map_err(to_io_err)?;
        for line in comments {
            writeln!(f, "# {line}").map_err(to_io_err)?;
        }
        let s = toml::to_string_pretty(&Self::default())
            .expect("The default request should be able to be serialized (this is a bug)");
        write!(f, "\n{s}").map_err(to_io_err)?;
        Ok(())
    }

    /// The JSON body submitted to the CDS
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({ "inputs": self.inputs })
    }
}

// ----------- //
// Credentials //
// ----------- //

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdsCredentials {
    pub url: String,
    pub key: String,
}

impl CdsCredentials {
    /// Resolve credentials from the environment, falling back on the `.cdsapirc` file.
    pub fn from_env_or_rc() -> Result<Self, CdsError> {
        let rc_path = std::env::var_os("CDSAPI_RC")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".cdsapirc")));
        Self::resolve(
            std::env::var("CDSAPI_URL").ok(),
            std::env::var("CDSAPI_KEY").ok(),
            rc_path,
        )
    }

    /// Combine credentials from the environment values and the rc file.
    ///
    /// A URL and key given in the environment are used as-is, without reading
    /// the rc file. Otherwise the rc file must exist and provide a key; values
    /// from the environment still override the corresponding rc lines.
    pub fn resolve(
        env_url: Option<String>,
        env_key: Option<String>,
        rc_path: Option<PathBuf>,
    ) -> Result<Self, CdsError> {
        if let (Some(url), Some(key)) = (&env_url, &env_key) {
            return Ok(Self {
                url: url.clone(),
                key: key.clone(),
            });
        }

        let rc_path = rc_path.unwrap_or_else(|| PathBuf::from("~/.cdsapirc"));
        if !rc_path.exists() {
            return Err(CdsError::NoCredentials(rc_path));
        }
        log::debug!("Reading CDS API credentials from {}", rc_path.display());
        let text = std::fs::read_to_string(&rc_path).map_err(|source| CdsError::ReadRc {
            path: rc_path.clone(),
            source,
        })?;

        let (rc_url, rc_key) = parse_rc(&text);
        let url = env_url.or(rc_url).unwrap_or_else(|| DEFAULT_CDS_URL.to_string());
        let key = env_key.or(rc_key).ok_or(CdsError::IncompleteRc {
            path: rc_path,
            key: "key",
        })?;
        Ok(Self { url, key })
    }
}

/// Extract the `url:` and `key:` values from the contents of a `.cdsapirc` file.
pub fn parse_rc(text: &str) -> (Option<String>, Option<String>) {
    let mut url = None;
    let mut key = None;
    for line in text.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim() {
            "url" => url = Some(value.to_string()),
            "key" => key = Some(value.to_string()),
            _ => {}
        }
    }
    (url, key)
}

// -------------- //
// Response types //
// -------------- //

/// Processing state of a CDS job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    Accepted,
    Running,
    Successful,
    Failed,
    Rejected,
    Dismissed,
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobState::Successful | JobState::Failed | JobState::Rejected | JobState::Dismissed
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    #[serde(rename = "jobID")]
    pub job_id: String,
    pub status: JobState,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    asset: Option<ResultAsset>,
}

#[derive(Debug, Deserialize)]
struct ResultAsset {
    value: ResultValue,
}

#[derive(Debug, Deserialize)]
struct ResultValue {
    href: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    title: Option<String>,
    detail: Option<String>,
}

// ------ //
// Client //
// ------ //

pub struct CdsClient {
    http: Client,
    credentials: CdsCredentials,
    poll_interval: Duration,
    max_wait: Duration,
}

impl CdsClient {
    pub fn new(credentials: CdsCredentials) -> Result<Self, CdsError> {
        let http = Client::builder()
            .user_agent(concat!("fcst-verify/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(60 * 60))
            .build()
            .map_err(|e| CdsError::http(&credentials.url, e))?;
        Ok(Self {
            http,
            credentials,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/retrieve/v1/{path}",
            self.credentials.url.trim_end_matches('/')
        )
    }

    fn get(&self, url: &str) -> Result<Response, CdsError> {
        let resp = self
            .http
            .get(url)
            .header("PRIVATE-TOKEN", self.credentials.key.as_str())
            .send()
            .map_err(|e| CdsError::http(url, e))?;
        check_response(url, resp)
    }

    /// Submit the request, returning the new job's initial status.
    pub fn submit(&self, request: &RetrieveRequest) -> Result<JobStatus, CdsError> {
        let url = self.endpoint(&format!("processes/{}/execution", request.dataset));
        log::debug!("Submitting request to {url}");
        let resp = self
            .http
            .post(&url)
            .header("PRIVATE-TOKEN", self.credentials.key.as_str())
            .json(&request.body())
            .send()
            .map_err(|e| CdsError::http(&url, e))?;
        let job: JobStatus = check_response(&url, resp)?
            .json()
            .map_err(|e| CdsError::http(&url, e))?;
        log::info!("Request accepted as job {} ({})", job.job_id, job.status);
        Ok(job)
    }

    pub fn job_status(&self, job_id: &str) -> Result<JobStatus, CdsError> {
        let url = self.endpoint(&format!("jobs/{job_id}"));
        self.get(&url)?.json().map_err(|e| CdsError::http(&url, e))
    }

    /// Poll the job until it finishes, it fails, or `max_wait` elapses.
    pub fn wait_for_job(&self, mut job: JobStatus) -> Result<JobStatus, CdsError> {
        let start = Instant::now();
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} CDS job {prefix}: {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_prefix(job.job_id.clone());
        pb.enable_steady_tick(Duration::from_millis(200));

        while !job.status.is_finished() {
            pb.set_message(job.status.to_string());
            if start.elapsed() >= self.max_wait {
                pb.abandon();
                return Err(CdsError::Timeout {
                    job_id: job.job_id,
                    waited: start.elapsed(),
                });
            }
            std::thread::sleep(self.poll_interval);
            let prev = job.status;
            job = self.job_status(&job.job_id)?;
            if job.status != prev {
                log::debug!("CDS job {} is now {}", job.job_id, job.status);
            }
        }
        pb.finish_with_message(job.status.to_string());

        if job.status != JobState::Successful {
            let detail = self.failure_detail(&job.job_id);
            return Err(CdsError::JobFailed {
                job_id: job.job_id,
                status: job.status,
                detail,
            });
        }
        Ok(job)
    }

    /// The reason a job failed, if the CDS gives one
    fn failure_detail(&self, job_id: &str) -> Option<String> {
        let url = self.endpoint(&format!("jobs/{job_id}/results"));
        let resp = self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", self.credentials.key.as_str())
            .send()
            .ok()?;
        let body: ErrorBody = resp.json().ok()?;
        body.detail.or(body.title)
    }

    /// The URL of a finished job's result file
    pub fn result_url(&self, job_id: &str) -> Result<String, CdsError> {
        let url = self.endpoint(&format!("jobs/{job_id}/results"));
        let results: JobResults = self.get(&url)?.json().map_err(|e| CdsError::http(&url, e))?;
        results
            .asset
            .map(|a| a.value.href)
            .ok_or_else(|| CdsError::NoDownloadUrl {
                job_id: job_id.to_string(),
            })
    }

    /// Stream the file at `url` to `path`, returning the number of bytes written.
    ///
    /// The data go to `<path>.partial` first, which is renamed to `path` only
    /// once the whole body has arrived. On any error the partial file is
    /// removed and `path` is left untouched.
    pub fn download_to(&self, url: &str, path: &Path) -> Result<u64, CdsError> {
        log::debug!("Downloading {url} to {}", path.display());
        let mut resp = self.get(url)?;
        let expected = resp.content_length();

        let pb = match expected {
            Some(n) => {
                let pb = ProgressBar::new(n);
                pb.set_style(
                    ProgressStyle::with_template("Downloading {wide_bar} [{bytes}/{total_bytes}]")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                pb
            }
            None => ProgressBar::new_spinner(),
        };

        let partial = partial_path(path);
        let result = stream_to_file(&mut resp, url, &partial, expected, &pb).and_then(|n| {
            std::fs::rename(&partial, path)
                .map(|_| n)
                .map_err(|source| CdsError::Write {
                    path: path.to_path_buf(),
                    source,
                })
        });
        let nbytes = match result {
            Ok(n) => n,
            Err(e) => {
                pb.abandon();
                if let Err(rm_err) = std::fs::remove_file(&partial) {
                    if rm_err.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("Could not remove {}: {rm_err}", partial.display());
                    }
                }
                return Err(e);
            }
        };
        pb.finish_and_clear();
        Ok(nbytes)
    }

    /// Carry out the whole retrieval and check the output, returning its size in bytes.
    pub fn retrieve(&self, request: &RetrieveRequest) -> Result<u64, CdsError> {
        let job = self.submit(request)?;
        let job = self.wait_for_job(job)?;
        let href = self.result_url(&job.job_id)?;
        self.download_to(&href, &request.output)?;
        verify_output(&request.output)
    }
}

/// `path` with `.partial` appended to its file name
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn stream_to_file(
    resp: &mut Response,
    url: &str,
    path: &Path,
    expected: Option<u64>,
    pb: &ProgressBar,
) -> Result<u64, CdsError> {
    let to_io_err = |source| CdsError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(to_io_err)?;
    let mut writer = pb.wrap_write(file);
    let nbytes = resp.copy_to(&mut writer).map_err(|e| CdsError::http(url, e))?;
    writer.flush().map_err(to_io_err)?;

    match expected {
        Some(n) if n != nbytes => Err(CdsError::Truncated {
            url: url.to_string(),
            expected: n,
            received: nbytes,
        }),
        _ => Ok(nbytes),
    }
}

fn check_response(url: &str, resp: Response) -> Result<Response, CdsError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    let body = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            detail: Some(d), ..
        }) => d,
        Ok(ErrorBody { title: Some(t), .. }) => t,
        _ => body,
    };
    Err(CdsError::Service {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Check that a download produced a non-empty file, returning its size in bytes.
pub fn verify_output(path: &Path) -> Result<u64, CdsError> {
    let meta = std::fs::metadata(path).map_err(|_| CdsError::MissingOutput(path.to_path_buf()))?;
    if meta.len() == 0 {
        return Err(CdsError::EmptyOutput(path.to_path_buf()));
    }
    Ok(meta.len())
}
