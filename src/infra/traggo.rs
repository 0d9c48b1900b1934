use crate::domain::{Cursor, Page, Tag, Task, TaskBase, TaskId};
use crate::infra::{Config, ServiceError, TaskService};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

const SPAN_FIELDS: &str = "id\n    start\n    end\n    tags {\n      key\n      value\n    }\n    oldStart\n    note";

/// GraphQL client for a Traggo server, authenticated by the session cookie.
pub struct TraggoClient {
    agent: ureq::Agent,
    url: String,
    token: String,
    offset: UtcOffset,
}

impl TraggoClient {
    pub fn new(url: &str, token: &str, timeout: Duration, offset: UtcOffset) -> Self {
        Self {
            agent: make_agent(timeout),
            url: url.to_string(),
            token: token.to_string(),
            offset,
        }
    }

    pub fn from_config(config: &Config, offset: UtcOffset) -> Self {
        Self::new(
            &config.auth.url,
            &config.auth.token,
            Duration::from_secs(config.request_timeout_secs.max(1)),
            offset,
        )
    }

    /// Trades a username and password for a non-expiring token.
    pub fn login(&self, username: &str, password: &str) -> Result<String, ServiceError> {
        let query = "mutation Login($name: String!, $pass: String!) {\n  login(username: $name, pass: $pass, deviceName: \"traggo-console\", type: NoExpiry, cookie: false) {\n    token\n  }\n}\n";
        let data: LoginData = self.execute(
            "Login",
            query,
            LoginVariables {
                name: username,
                pass: password,
            },
        )?;
        data.login
            .map(|login| login.token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ServiceError::Service("login returned no token".to_string()))
    }

    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }

    fn execute<V, T>(&self, operation_name: &str, query: &str, variables: V) -> Result<T, ServiceError>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        log::debug!("graphql {operation_name}");
        let op = Operation {
            operation_name,
            variables,
            query,
        };
        let result = self.post(&op);
        if let Err(error) = &result {
            log::warn!("graphql {operation_name} failed: {error}");
        }
        result
    }

    fn post<V, T>(&self, op: &Operation<'_, V>) -> Result<T, ServiceError>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let mut response = self
            .agent
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Cookie", &format!("traggo={}", self.token))
            .send_json(op)
            .map_err(|error| match error {
                ureq::Error::StatusCode(code) => ServiceError::Status(code),
                other => ServiceError::Transport(other.to_string()),
            })?;

        let parsed: GraphQlResponse<T> = response
            .body_mut()
            .read_json()
            .map_err(|error| ServiceError::Decode(error.to_string()))?;

        if !parsed.errors.is_empty() {
            let messages: Vec<String> = parsed.errors.into_iter().map(|error| error.message).collect();
            return Err(ServiceError::Service(messages.join("; ")));
        }
        parsed
            .data
            .ok_or_else(|| ServiceError::Decode("response has no data".to_string()))
    }

    fn fetch_page(&self, operation_name: &str, query: &str, variables: impl Serialize) -> Result<Page, ServiceError> {
        let data: TimeSpansData = self.execute(operation_name, query, variables)?;
        let tasks = data
            .time_spans
            .time_spans
            .into_iter()
            .map(TimeSpanDto::into_task)
            .collect::<Result<Vec<_>, _>>()?;
        let next = Cursor {
            offset: data.time_spans.cursor.offset,
            page_size: data.time_spans.cursor.page_size.unwrap_or(0),
            has_more: data.time_spans.cursor.has_more,
        };
        Ok(Page { tasks, next })
    }
}

fn make_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    config.into()
}

impl TaskService for TraggoClient {
    fn fetch_running(&self) -> Result<Vec<Task>, ServiceError> {
        let query = format!("query Trackers {{\n  timers {{\n    {SPAN_FIELDS}\n  }}\n}}\n");
        let data: TimersData = self.execute("Trackers", &query, NoVariables {})?;
        data.timers
            .unwrap_or_default()
            .into_iter()
            .map(TimeSpanDto::into_task)
            .collect()
    }

    fn fetch_completed(&self, cursor: Cursor) -> Result<Page, ServiceError> {
        let query = format!(
            "query TimeSpans($cursor: InputCursor!) {{\n  timeSpans(cursor: $cursor) {{\n    timeSpans {{\n    {SPAN_FIELDS}\n    }}\n    cursor {{\n      hasMore\n      startId\n      offset\n      pageSize\n    }}\n  }}\n}}\n"
        );
        self.fetch_page(
            "TimeSpans",
            &query,
            CursorVariables {
                cursor: CursorRequest::from(cursor),
            },
        )
    }

    fn fetch_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
        cursor: Cursor,
    ) -> Result<Page, ServiceError> {
        let query = format!(
            "query TimeSpansInRange($start: Time!, $end: Time!, $cursor: InputCursor) {{\n  timeSpans(fromInclusive: $start, toInclusive: $end, cursor: $cursor) {{\n    timeSpans {{\n    {SPAN_FIELDS}\n    }}\n    cursor {{\n      hasMore\n      startId\n      offset\n      pageSize\n    }}\n  }}\n}}\n"
        );
        self.fetch_page(
            "TimeSpansInRange",
            &query,
            RangeVariables {
                start: format_rfc3339(start)?,
                end: format_rfc3339(end)?,
                cursor: CursorRequest::from(cursor),
            },
        )
    }

    fn create(&self, tags: &[Tag], note: &str) -> Result<Task, ServiceError> {
        let query = format!(
            "mutation StartTimer($start: Time!, $tags: [InputTimeSpanTag!], $note: String!) {{\n  createTimeSpan(start: $start, tags: $tags, note: $note) {{\n    {SPAN_FIELDS}\n  }}\n}}\n"
        );
        let data: CreateData = self.execute(
            "StartTimer",
            &query,
            CreateVariables {
                start: format_rfc3339(self.now())?,
                tags: tags.iter().map(TagDto::from).collect(),
                note: note.to_string(),
            },
        )?;
        data.create_time_span.into_task()
    }

    fn update(&self, task: &Task) -> Result<Task, ServiceError> {
        let query = format!(
            "mutation UpdateTimeSpan($id: Int!, $start: Time!, $end: Time, $tags: [InputTimeSpanTag!], $oldStart: Time, $note: String!) {{\n  updateTimeSpan(id: $id, start: $start, end: $end, tags: $tags, oldStart: $oldStart, note: $note) {{\n    {SPAN_FIELDS}\n  }}\n}}\n"
        );
        let base = task.base();
        let data: UpdateData = self.execute(
            "UpdateTimeSpan",
            &query,
            UpdateVariables {
                id: base.id,
                start: format_rfc3339(base.start)?,
                end: task.end().map(format_rfc3339).transpose()?,
                tags: base.tags.iter().map(TagDto::from).collect(),
                old_start: base.old_start.map(format_rfc3339).transpose()?,
                note: base.note.clone(),
            },
        )?;
        data.update_time_span.into_task()
    }

    fn delete(&self, id: TaskId) -> Result<(), ServiceError> {
        let query = "mutation RemoveTimeSpan($id: Int!) {\n  removeTimeSpan(id: $id) {\n    id\n  }\n}\n";
        let data: RemoveData = self.execute("RemoveTimeSpan", query, IdVariables { id })?;
        match data.remove_time_span {
            Some(value) if !value.is_null() => Ok(()),
            _ => Err(ServiceError::NotFound(id)),
        }
    }

    fn continue_task(&self, id: TaskId) -> Result<Task, ServiceError> {
        let query = format!(
            "mutation Continue($id: Int!, $start: Time!) {{\n  copyTimeSpan(id: $id, start: $start) {{\n    {SPAN_FIELDS}\n  }}\n}}\n"
        );
        let data: CopyData = self.execute(
            "Continue",
            &query,
            StartVariables {
                id,
                start: format_rfc3339(self.now())?,
            },
        )?;
        data.copy_time_span.into_task()
    }

    fn stop(&self, id: TaskId) -> Result<Task, ServiceError> {
        let query = format!(
            "mutation StopTimer($id: Int!, $end: Time!) {{\n  stopTimeSpan(id: $id, end: $end) {{\n    {SPAN_FIELDS}\n  }}\n}}\n"
        );
        let data: StopData = self.execute(
            "StopTimer",
            &query,
            EndVariables {
                id,
                end: format_rfc3339(self.now())?,
            },
        )?;
        data.stop_time_span.into_task()
    }

    fn ping(&self) -> Result<String, ServiceError> {
        let query = "query CurrentUser {\n  user: currentUser {\n    name\n    id\n  }\n}\n";
        let data: UserData = self.execute("CurrentUser", query, NoVariables {})?;
        data.user.map(|user| user.name).ok_or_else(|| {
            ServiceError::Service("no user for this token".to_string())
        })
    }
}

fn format_rfc3339(value: OffsetDateTime) -> Result<String, ServiceError> {
    value
        .format(&Rfc3339)
        .map_err(|error| ServiceError::Decode(error.to_string()))
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, ServiceError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|error| ServiceError::Decode(format!("bad timestamp {value:?}: {error}")))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Operation<'a, V> {
    operation_name: &'a str,
    variables: V,
    query: &'a str,
}

#[derive(Serialize)]
struct NoVariables {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CursorRequest {
    offset: u32,
    page_size: u32,
}

impl From<Cursor> for CursorRequest {
    fn from(cursor: Cursor) -> Self {
        Self {
            offset: cursor.offset,
            page_size: cursor.page_size,
        }
    }
}

#[derive(Serialize)]
struct CursorVariables {
    cursor: CursorRequest,
}

#[derive(Serialize)]
struct RangeVariables {
    start: String,
    end: String,
    cursor: CursorRequest,
}

#[derive(Serialize)]
struct CreateVariables {
    start: String,
    tags: Vec<TagDto>,
    note: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateVariables {
    id: TaskId,
    start: String,
    end: Option<String>,
    tags: Vec<TagDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_start: Option<String>,
    note: String,
}

#[derive(Serialize)]
struct LoginVariables<'a> {
    name: &'a str,
    pass: &'a str,
}

#[derive(Serialize)]
struct IdVariables {
    id: TaskId,
}

#[derive(Serialize)]
struct StartVariables {
    id: TaskId,
    start: String,
}

#[derive(Serialize)]
struct EndVariables {
    id: TaskId,
    end: String,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Serialize, Deserialize)]
struct TagDto {
    key: String,
    value: String,
}

impl From<&Tag> for TagDto {
    fn from(tag: &Tag) -> Self {
        Self {
            key: tag.key.clone(),
            value: tag.value.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeSpanDto {
    id: TaskId,
    start: String,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    tags: Option<Vec<TagDto>>,
    #[serde(default)]
    old_start: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

impl TimeSpanDto {
    fn into_task(self) -> Result<Task, ServiceError> {
        let base = TaskBase {
            id: self.id,
            start: parse_rfc3339(&self.start)?,
            old_start: self.old_start.as_deref().map(parse_rfc3339).transpose()?,
            tags: self
                .tags
                .unwrap_or_default()
                .into_iter()
                .map(|tag| Tag::new(tag.key, tag.value))
                .collect(),
            note: self.note.unwrap_or_default(),
        };
        Ok(match self.end.as_deref() {
            Some(end) => Task::Completed {
                base,
                end: parse_rfc3339(end)?,
            },
            None => Task::Running(base),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorDto {
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    offset: u32,
    #[serde(default)]
    page_size: Option<u32>,
}

#[derive(Deserialize)]
struct TimersData {
    timers: Option<Vec<TimeSpanDto>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeSpanPageDto {
    time_spans: Vec<TimeSpanDto>,
    cursor: CursorDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeSpansData {
    time_spans: TimeSpanPageDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateData {
    create_time_span: TimeSpanDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateData {
    update_time_span: TimeSpanDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveData {
    remove_time_span: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CopyData {
    copy_time_span: TimeSpanDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopData {
    stop_time_span: TimeSpanDto,
}

#[derive(Deserialize)]
struct LoginDto {
    token: String,
}

#[derive(Deserialize)]
struct LoginData {
    login: Option<LoginDto>,
}

#[derive(Deserialize)]
struct UserDto {
    name: String,
}

#[derive(Deserialize)]
struct UserData {
    user: Option<UserDto>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    struct CapturedRequest {
        headers: Vec<String>,
        body: serde_json::Value,
    }

    /// Answers exactly one request with `status` and `body`.
    fn serve_once(status: u16, body: &'static str) -> (String, mpsc::Receiver<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}/graphql", listener.local_addr().expect("addr"));
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut headers = Vec::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read line");
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().expect("length");
                    }
                }
                headers.push(line);
            }
            let mut raw = vec![0u8; content_length];
            reader.read_exact(&mut raw).expect("body");
            let request_body = serde_json::from_slice(&raw).expect("json body");
            let _ = tx.send(CapturedRequest {
                headers,
                body: request_body,
            });

            let mut stream = stream;
            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).expect("write");
        });

        (url, rx)
    }

    fn client(url: &str) -> TraggoClient {
        TraggoClient::new(url, "secret", Duration::from_secs(5), UtcOffset::UTC)
    }

    #[test]
    fn fetch_running_sends_cookie_and_decodes_timers() {
        let (url, rx) = serve_once(
            200,
            r#"{"data":{"timers":[{"id":5,"start":"2025-09-12T09:00:00Z","end":null,"tags":[{"key":"type","value":"dev"}],"oldStart":null,"note":"hi"}]}}"#,
        );

        let tasks = client(&url).fetch_running().expect("running");
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].is_running());
        assert_eq!(tasks[0].tags(), &[Tag::new("type", "dev")]);
        assert_eq!(tasks[0].note(), "hi");

        let request = rx.recv().expect("request");
        assert!(
            request
                .headers
                .iter()
                .any(|line| line.eq_ignore_ascii_case("cookie: traggo=secret"))
        );
        assert_eq!(request.body["operationName"], "Trackers");
    }

    #[test]
    fn fetch_completed_threads_the_cursor() {
        let (url, rx) = serve_once(
            200,
            r#"{"data":{"timeSpans":{"timeSpans":[{"id":8,"start":"2025-09-12T09:00:00Z","end":"2025-09-12T10:00:00Z","tags":[],"note":""}],"cursor":{"hasMore":true,"startId":8,"offset":200,"pageSize":100}}}}"#,
        );

        let cursor = Cursor {
            offset: 100,
            page_size: 100,
            has_more: true,
        };
        let page = client(&url).fetch_completed(cursor).expect("page");
        assert_eq!(page.tasks.len(), 1);
        assert_eq!(page.tasks[0].kind(), crate::domain::TaskKind::Completed);
        assert_eq!(page.next.offset, 200);
        assert!(page.next.has_more);

        let request = rx.recv().expect("request");
        assert_eq!(request.body["variables"]["cursor"]["offset"], 100);
        assert_eq!(request.body["variables"]["cursor"]["pageSize"], 100);
    }

    #[test]
    fn graphql_errors_become_service_errors() {
        let (url, _rx) = serve_once(
            200,
            r#"{"data":null,"errors":[{"message":"timespan not found"}]}"#,
        );
        let error = client(&url).stop(3).expect_err("error");
        assert_eq!(error, ServiceError::Service("timespan not found".to_string()));
    }

    #[test]
    fn non_success_status_is_reported() {
        let (url, _rx) = serve_once(401, r#"{"error":"unauthorized"}"#);
        let error = client(&url).ping().expect_err("error");
        assert_eq!(error, ServiceError::Status(401));
    }

    #[test]
    fn update_sends_old_start_and_optional_end() {
        let (url, rx) = serve_once(
            200,
            r#"{"data":{"updateTimeSpan":{"id":5,"start":"2025-09-12T08:00:00Z","end":null,"tags":[],"oldStart":"2025-09-12T09:00:00Z","note":""}}}"#,
        );
        let task = Task::Running(TaskBase {
            id: 5,
            start: time::macros::datetime!(2025-09-12 08:00:00 UTC),
            old_start: Some(time::macros::datetime!(2025-09-12 09:00:00 UTC)),
            tags: Vec::new(),
            note: String::new(),
        });

        let updated = client(&url).update(&task).expect("update");
        assert_eq!(updated.id(), 5);

        let request = rx.recv().expect("request");
        let variables = &request.body["variables"];
        assert_eq!(variables["oldStart"], "2025-09-12T09:00:00Z");
        assert!(variables["end"].is_null());
        assert_eq!(variables["start"], "2025-09-12T08:00:00Z");
    }

    #[test]
    fn login_returns_the_issued_token() {
        let (url, rx) = serve_once(200, r#"{"data":{"login":{"token":"fresh-token"}}}"#);
        let token = client(&url).login("admin", "hunter2").expect("login");
        assert_eq!(token, "fresh-token");

        let request = rx.recv().expect("request");
        assert_eq!(request.body["operationName"], "Login");
        assert_eq!(request.body["variables"]["name"], "admin");
        assert_eq!(request.body["variables"]["pass"], "hunter2");
    }
}
