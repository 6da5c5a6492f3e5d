use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BitbucketConfig;
use crate::dedup::TimeoutQueue;
use crate::plugin::prelude::*;

mod client;

/// Rendered in place of a missing title, status or author.
const MISSING: &str = "None";

/// Sent when the listing command finds nothing.
const NO_PULL_REQUESTS: &str = "no open pull requests";

/// Errors raised while talking to the Bitbucket API.
#[derive(Error, Debug)]
pub enum Error {
    /// The HTTP client could not be built.
    #[error("could not build http client")]
    Init(#[source] reqwest::Error),
    /// A single pull request lookup failed for any reason.
    #[error("pull-request not found: #{0}")]
    PullRequestNotFound(u64),
    /// The listing request failed for any reason.
    #[error("Url not found: {0}")]
    UrlNotFound(String),
    /// The request could not be sent or the response body could not be read.
    #[error("request error: {0}")]
    Request(#[source] reqwest::Error),
    /// The response body was not the expected JSON.
    #[error("could not deserialize response: {0}")]
    Deserialize(#[source] serde_path_to_error::Error<serde_json::Error>),
}

/// The review state of a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Awaiting review.
    Open,
    /// Also reported as `fulfilled` by older API versions.
    Merged,
    /// Closed without merging.
    Declined,
    /// Replaced by another pull request.
    Superseded,
    /// Any state this plugin doesn't know about, as sent by the server.
    Other(String),
}

impl From<&str> for Status {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "open" => Self::Open,
            "merged" | "fulfilled" => Self::Merged,
            "declined" => Self::Declined,
            "superseded" => Self::Superseded,
            _ => Self::Other(value.to_string()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("OPEN"),
            Self::Merged => f.write_str("MERGED"),
            Self::Declined => f.write_str("DECLINED"),
            Self::Superseded => f.write_str("SUPERSEDED"),
            Self::Other(other) => f.write_str(&other.to_uppercase()),
        }
    }
}

/// A pull request, normalized from an API payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// The repository-local pull request number.
    pub id: u64,
    /// The pull request title.
    pub title: Option<String>,
    /// The review state.
    pub status: Option<Status>,
    /// Display name of the user who opened the pull request.
    pub author: Option<String>,
    /// Display name of the user who merged or declined the pull request.
    pub closed_by: Option<String>,
    /// Link to the pull request in the web interface.
    pub url: String,
}

/// Formats the pull request as a single line:
///
/// `0042  https://bitbucket.org/acct/repo/pull-request/42   MERGED   "Fix bug"  by Alice`
///
/// Missing fields are written as `None`.
impl fmt::Display for PullRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self
            .status
            .as_ref()
            .map_or_else(|| MISSING.to_string(), ToString::to_string);

        write!(
            f,
            "{:04}  {}   {}   \"{}\"  by {}",
            self.id,
            self.url,
            status,
            self.title.as_deref().unwrap_or(MISSING),
            self.author.as_deref().unwrap_or(MISSING),
        )
    }
}

/// Matches "pull request", "pull-request" or "pullrequest" followed by one or more ids, each
/// optionally prefixed with `#`.
fn snarf_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();

    REGEX.get_or_init(|| {
        Regex::new(r"(?i)(?:pull request|pull-request|pullrequest)[\s#]*(?P<ids>\d+(?:[\s#]+\d+)*)")
            .expect("snarf pattern is valid")
    })
}

/// Extracts every pull request id mentioned in `text`, in order of appearance. Ids too large to
/// be a pull request number are skipped.
#[must_use]
pub fn extract_ids(text: &str) -> Vec<u64> {
    snarf_regex()
        .captures_iter(text)
        .filter_map(|captures| captures.name("ids"))
        .flat_map(|ids| {
            ids.as_str()
                .split(|c: char| c.is_whitespace() || c == '#')
                .filter(|id| !id.is_empty())
        })
        .filter_map(|id| {
            id.parse::<u64>()
                .inspect_err(|err| warn!(%id, %err, "ignoring unparseable pull request id"))
                .ok()
        })
        .collect()
}

/// Announces pull requests mentioned in chat and lists open pull requests on request.
pub struct Bitbucket {
    /// Bitbucket REST API client.
    api: client::Client,
    /// Recently announced pull request ids.
    seen: Mutex<TimeoutQueue<u64>>,
    /// `.pullrequests` listing command.
    list_command: ZetaCommand,
}

#[async_trait]
impl Plugin for Bitbucket {
    fn new(ctx: &Context) -> Result<Self, ZetaError> {
        Self::with_config(&ctx.config.bitbucket).map_err(|err| ZetaError::PluginInit {
            name: Self::name().to_string(),
            source: Box::new(err),
        })
    }

    fn name() -> Name {
        Name::from("bitbucket")
    }

    fn author() -> Author {
        Author::from("Mikkel Kroman <mk@maero.dk>")
    }

    fn version() -> Version {
        Version::from("0.1")
    }

    async fn handle_message(
        &self,
        _ctx: &Context,
        client: &Client,
        message: &Message,
    ) -> Result<(), ZetaError> {
        if let Some((target, lines)) = self.replies(message).await {
            for line in lines {
                client.send_privmsg(target, line)?;
            }
        }

        Ok(())
    }
}

impl Bitbucket {
    /// Returns where to reply to `message` and the lines to send, or `None` if there is
    /// nothing to say.
    ///
    /// Only `PRIVMSG` is handled. The reply target is the channel, or the sender's nick for a
    /// private query.
    pub async fn replies<'a>(&self, message: &'a Message) -> Option<(&'a str, Vec<String>)> {
        let Command::PRIVMSG(_, ref user_message) = message.command else {
            return None;
        };
        let target = message.response_target()?;

        let lines = if self.list_command.parse(user_message).is_some() {
            self.handle_list().await
        } else {
            self.handle_snarf(user_message).await
        };

        (!lines.is_empty()).then_some((target, lines))
    }

    /// Creates the plugin for the repository described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] if the HTTP client cannot be built.
    pub fn with_config(config: &BitbucketConfig) -> Result<Self, Error> {
        let api = client::Client::new(config)?;
        let list_command = ZetaCommand::new(".pullrequests").alias(".prs");

        debug!(
            account = %config.account_name,
            repo = %config.repo_slug,
            timeout = ?config.snarfer_timeout,
            "watching repository"
        );

        Ok(Self {
            api,
            seen: Mutex::new(TimeoutQueue::new(config.snarfer_timeout)),
            list_command,
        })
    }

    /// Looks up each pull request mentioned in `text` and returns one line per lookup, in the
    /// order the ids appear. Ids that were looked up within the snarfer timeout are skipped.
    pub async fn handle_snarf(&self, text: &str) -> Vec<String> {
        let ids = extract_ids(text);

        if ids.is_empty() {
            return vec![];
        }

        debug!(?ids, "snarfed pull request id(s)");

        let mut lines = Vec::with_capacity(ids.len());

        for id in ids {
            if !self.check_timeout(id) {
                debug!(%id, "pull request was snarfed recently, skipping");
                continue;
            }

            match self.api.fetch(id).await {
                Ok(pull_request) => lines.push(pull_request.to_string()),
                Err(err) => {
                    warn!(%id, error = ?err, "could not look up pull request");

                    lines.push(Error::PullRequestNotFound(id).to_string());
                }
            }
        }

        lines
    }

    /// Lists the repository's open pull requests, one line each.
    pub async fn handle_list(&self) -> Vec<String> {
        debug!(command = %self.list_command.name(), "listing pull requests");

        match self.api.fetch_all().await {
            Ok(pull_requests) if pull_requests.is_empty() => vec![NO_PULL_REQUESTS.to_string()],
            Ok(pull_requests) => pull_requests.iter().map(ToString::to_string).collect(),
            Err(err) => {
                warn!(error = ?err, "could not list pull requests");

                vec![Error::UrlNotFound(self.api.list_url().to_string()).to_string()]
            }
        }
    }

    /// Returns `true` and marks `id` as seen unless it was already seen within the timeout.
    fn check_timeout(&self, id: u64) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .check_and_mark(id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::{Config, IrcConfig};

    fn config_for(server: &MockServer) -> BitbucketConfig {
        let mut config = BitbucketConfig::new("acct", "repo");
        config.api_url = Url::parse(&server.uri()).unwrap();
        config.snarfer_timeout = Duration::from_secs(60);
        config
    }

    fn pull_request_body(id: u64) -> serde_json::Value {
        json!({
            "status": "OPEN",
            "title": format!("Change {id}"),
            "user": { "display_name": "Alice" },
            "id": id
        })
    }

    async fn mount_pull_request(server: &MockServer, id: u64, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/repositories/acct/repo/pullrequests/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(pull_request_body(id)))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn formats_merged_pull_request() {
        let pull_request = PullRequest {
            id: 42,
            title: Some("Fix bug".to_string()),
            status: Some(Status::from("fulfilled")),
            author: Some("Alice".to_string()),
            closed_by: None,
            url: "https://bitbucket.org/acct/repo/pull-request/42".to_string(),
        };

        assert_eq!(
            pull_request.to_string(),
            "0042  https://bitbucket.org/acct/repo/pull-request/42   MERGED   \"Fix bug\"  by Alice"
        );
    }

    #[test]
    fn formats_missing_fields_as_none() {
        let pull_request = PullRequest {
            id: 12345,
            title: None,
            status: None,
            author: None,
            closed_by: None,
            url: "https://bitbucket.org/acct/repo/pull-request/12345".to_string(),
        };

        assert_eq!(
            pull_request.to_string(),
            "12345  https://bitbucket.org/acct/repo/pull-request/12345   None   \"None\"  by None"
        );
    }

    #[test]
    fn status_parsing() {
        let tests = [
            ("OPEN", Status::Open),
            ("merged", Status::Merged),
            ("Fulfilled", Status::Merged),
            ("DECLINED", Status::Declined),
            ("superseded", Status::Superseded),
            ("draft", Status::Other("draft".to_string())),
        ];

        for (input, expected) in tests {
            assert_eq!(Status::from(input), expected);
        }

        assert_eq!(Status::from("draft").to_string(), "DRAFT");
    }

    #[test]
    fn extracts_ids() {
        let tests: [(&str, &[u64]); 8] = [
            ("have a look at pull request #5", &[5]),
            ("pull request #5 #5", &[5, 5]),
            ("pull-request#9", &[9]),
            ("PullRequest 12 and pull request 13", &[12, 13]),
            ("pull requests 3 4", &[]),
            ("pull request #1 #2 3", &[1, 2, 3]),
            ("pull request #99999999999999999999999", &[]),
            ("no mention here 42", &[]),
        ];

        for (input, expected) in tests {
            assert_eq!(extract_ids(input), expected, "input: {input}");
        }
    }

    #[tokio::test]
    async fn snarf_formats_pull_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/acct/repo/pullrequests/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "fulfilled",
                "title": "Fix bug",
                "user": { "display_name": "Alice" },
                "id": 42
            })))
            .mount(&server)
            .await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();
        let lines = plugin.handle_snarf("see pull request #42").await;

        assert_eq!(
            lines,
            ["0042  https://bitbucket.org/acct/repo/pull-request/42   MERGED   \"Fix bug\"  by Alice"]
        );
    }

    #[tokio::test]
    async fn snarf_suppresses_repeats_within_message() {
        let server = MockServer::start().await;
        mount_pull_request(&server, 5, 1).await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();
        let lines = plugin.handle_snarf("pull request #5 #5").await;

        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("0005  "));
    }

    #[tokio::test]
    async fn snarf_suppresses_repeats_across_messages() {
        let server = MockServer::start().await;
        mount_pull_request(&server, 5, 1).await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();

        assert_eq!(plugin.handle_snarf("pull request 5").await.len(), 1);
        assert!(plugin.handle_snarf("pull-request #5").await.is_empty());
    }

    #[tokio::test]
    async fn snarf_without_timeout_fetches_every_time() {
        let server = MockServer::start().await;
        mount_pull_request(&server, 5, 2).await;

        let mut config = config_for(&server);
        config.snarfer_timeout = Duration::ZERO;
        let plugin = Bitbucket::with_config(&config).unwrap();

        assert_eq!(plugin.handle_snarf("pull request 5").await.len(), 1);
        assert_eq!(plugin.handle_snarf("pull request 5").await.len(), 1);
    }

    #[tokio::test]
    async fn snarf_recognizes_compact_form() {
        let server = MockServer::start().await;
        mount_pull_request(&server, 9, 1).await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();
        let lines = plugin.handle_snarf("pull-request#9").await;

        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("pull-request/9"));
    }

    #[tokio::test]
    async fn snarf_preserves_order_and_reports_missing() {
        let server = MockServer::start().await;
        mount_pull_request(&server, 3, 1).await;
        mount_pull_request(&server, 1, 1).await;

        Mock::given(method("GET"))
            .and(path("/repositories/acct/repo/pullrequests/2"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();
        let lines = plugin.handle_snarf("pull request #3 #2 #1").await;

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("0003  "));
        assert_eq!(lines[1], "pull-request not found: #2");
        assert!(lines[2].starts_with("0001  "));
    }

    #[tokio::test]
    async fn snarf_reports_malformed_response_as_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/acct/repo/pullrequests/4"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();

        assert_eq!(
            plugin.handle_snarf("pull request 4").await,
            ["pull-request not found: #4"]
        );
    }

    #[tokio::test]
    async fn snarf_ignores_unrelated_text() {
        let server = MockServer::start().await;
        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();

        assert!(plugin.handle_snarf("issue #5 is fixed").await.is_empty());
    }

    #[tokio::test]
    async fn list_emits_one_line_per_pull_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/acct/repo/pullrequests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [pull_request_body(8), pull_request_body(6)]
            })))
            .mount(&server)
            .await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();
        let lines = plugin.handle_list().await;

        assert_eq!(
            lines,
            [
                "0008  https://bitbucket.org/acct/repo/pull-request/8   OPEN   \"Change 8\"  by Alice",
                "0006  https://bitbucket.org/acct/repo/pull-request/6   OPEN   \"Change 6\"  by Alice",
            ]
        );
    }

    #[tokio::test]
    async fn list_reports_empty_listing() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/acct/repo/pullrequests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "values": [] })))
            .mount(&server)
            .await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();

        assert_eq!(plugin.handle_list().await, [NO_PULL_REQUESTS]);
    }

    #[tokio::test]
    async fn list_reports_url_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/acct/repo/pullrequests"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();
        let expected = format!(
            "Url not found: {}/repositories/acct/repo/pullrequests",
            server.uri()
        );

        assert_eq!(plugin.handle_list().await, [expected]);
    }

    #[tokio::test]
    async fn list_does_not_touch_snarfer_timeout() {
        let server = MockServer::start().await;
        mount_pull_request(&server, 8, 1).await;

        Mock::given(method("GET"))
            .and(path("/repositories/acct/repo/pullrequests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [pull_request_body(8)]
            })))
            .mount(&server)
            .await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();

        assert_eq!(plugin.handle_list().await.len(), 1);
        assert_eq!(plugin.handle_snarf("pull request 8").await.len(), 1);
    }

    fn message(line: &str) -> Message {
        line.parse().unwrap()
    }

    async fn mount_listing(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/repositories/acct/repo/pullrequests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [pull_request_body(3)]
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn replies_to_channel_without_nick_prefix() {
        let server = MockServer::start().await;
        mount_pull_request(&server, 5, 1).await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();
        let message = message(":alice!alice@example.com PRIVMSG #dev :pull request #5\r\n");
        let (target, lines) = plugin.replies(&message).await.unwrap();

        assert_eq!(target, "#dev");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("0005  "));
        assert!(!lines[0].contains("alice"));
    }

    #[tokio::test]
    async fn replies_to_sender_of_private_query() {
        let server = MockServer::start().await;
        mount_pull_request(&server, 5, 1).await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();
        let message = message(":alice!alice@example.com PRIVMSG snarfer :pull request #5\r\n");
        let (target, lines) = plugin.replies(&message).await.unwrap();

        assert_eq!(target, "alice");
        assert!(lines[0].starts_with("0005  "));
    }

    #[tokio::test]
    async fn list_commands_route_to_listing() {
        let server = MockServer::start().await;
        mount_listing(&server, 2).await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();

        for command in [".pullrequests", ".prs"] {
            let message = message(&format!(
                ":alice!alice@example.com PRIVMSG #dev :{command}\r\n"
            ));
            let (target, lines) = plugin.replies(&message).await.unwrap();

            assert_eq!(target, "#dev");
            assert_eq!(lines.len(), 1);
            assert!(lines[0].starts_with("0003  "));
        }
    }

    #[tokio::test]
    async fn other_text_routes_to_snarf() {
        let server = MockServer::start().await;
        mount_listing(&server, 0).await;
        mount_pull_request(&server, 5, 1).await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();
        let message = message(":alice!alice@example.com PRIVMSG #dev :.prsx pull request #5\r\n");
        let (_, lines) = plugin.replies(&message).await.unwrap();

        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("0005  "));
    }

    #[tokio::test]
    async fn ignores_notices() {
        let server = MockServer::start().await;
        mount_pull_request(&server, 5, 0).await;

        let plugin = Bitbucket::with_config(&config_for(&server)).unwrap();
        let message = message(":alice!alice@example.com NOTICE #dev :pull request #5\r\n");

        assert!(plugin.replies(&message).await.is_none());
    }

    #[tokio::test]
    async fn handle_message_sends_over_irc_client() {
        let server = MockServer::start().await;
        mount_pull_request(&server, 5, 1).await;

        let ctx = Context::new(Config {
            tracing: Default::default(),
            irc: IrcConfig::default(),
            bitbucket: config_for(&server),
        });
        let plugin = Bitbucket::new(&ctx).unwrap();
        let client = Client::from_config(irc::client::data::Config {
            nickname: Some("snarfer".to_string()),
            server: Some("irc.test.net".to_string()),
            use_mock_connection: true,
            ..Default::default()
        })
        .await
        .unwrap();
        let message = message(":alice!alice@example.com PRIVMSG #dev :pull request #5\r\n");

        assert!(plugin.handle_message(&ctx, &client, &message).await.is_ok());
    }
}
