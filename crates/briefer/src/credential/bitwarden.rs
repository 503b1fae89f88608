//! Bitwarden vault provider driven through the `bw` command line client.
//!
//! The provider needs an unlocked session. It reuses `BW_SESSION` when that validates, otherwise
//! it unlocks with the master password from `BW_PASSWORD`. The password is written to the child's
//! standard input and never appears in argv, the environment of the child, or a log line.
//!
//! Items are looked up by name inside one folder and their slots are mapped onto logical fields:
//!
//! | Vault slot             | Logical field                                             |
//! |------------------------|-----------------------------------------------------------|
//! | `login.username`       | `client_id`                                               |
//! | `login.password`       | `client_secret` / `api_key` / `token` / `credentials_json` |
//! | first `login.uris`     | `base_url`                                                |
//! | custom field `<name>`  | `<name>`                                                  |
//! | notes line `<name>: v` | `<name>`                                                  |

use std::process::Stdio;

use tokio::io::AsyncWriteExt;

use super::*;

/// Ceiling on the unlock subprocess.
pub const UNLOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Ceiling on a `bw status` probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shortest token accepted as a session before probing.
pub const MIN_SESSION_LENGTH: usize = 10;

/// Token for an unlocked vault session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionHandle(String);

impl SessionHandle {
  /// The raw token, for handing to the `bw` child process.
  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Debug for SessionHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("SessionHandle(<redacted>)")
  }
}

/// Captured result of one vault command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultOutput {
  /// Whether the command exited successfully
  pub success: bool,
  /// Trimmed standard output
  pub stdout:  String,
  /// Trimmed standard error
  pub stderr:  String,
}

impl VaultOutput {
  /// A successful result with the given output.
  pub fn ok(stdout: impl Into<String>) -> Self {
    Self { success: true, stdout: stdout.into(), stderr: String::new() }
  }

  /// A failed result with the given error text.
  pub fn failed(stderr: impl Into<String>) -> Self {
    Self { success: false, stdout: String::new(), stderr: stderr.into() }
  }
}

/// Runs vault commands. Implemented by [`VaultCli`]; tests substitute their own.
#[async_trait]
pub trait VaultCommand: Send + Sync {
  /// Runs the vault client with `args`.
  ///
  /// `session` is handed to the child through `BW_SESSION`; `stdin`, when given, is written to the
  /// child's standard input followed by a newline.
  ///
  /// # Errors
  ///
  /// [`BrieferError::SecretBackendUnavailable`] when the client is not installed.
  async fn run(
    &self,
    args: &[&str],
    session: Option<&str>,
    stdin: Option<&str>,
  ) -> Result<VaultOutput>;
}

/// The `bw` executable.
#[derive(Debug, Clone)]
pub struct VaultCli {
  /// Program to execute
  program: PathBuf,
}

impl Default for VaultCli {
  fn default() -> Self { Self { program: PathBuf::from("bw") } }
}

impl VaultCli {
  /// Uses a specific executable instead of `bw` from `PATH`.
  pub fn with_program(program: impl Into<PathBuf>) -> Self { Self { program: program.into() } }
}

#[async_trait]
impl VaultCommand for VaultCli {
  async fn run(
    &self,
    args: &[&str],
    session: Option<&str>,
    stdin: Option<&str>,
  ) -> Result<VaultOutput> {
    trace!("Running {} {}", self.program.display(), args.join(" "));
    let mut command = tokio::process::Command::new(&self.program);
    command
      .args(args)
      .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(session) = session {
      command.env("BW_SESSION", session);
    }

    let mut child = command.spawn().map_err(|e| match e.kind() {
      std::io::ErrorKind::NotFound => BrieferError::SecretBackendUnavailable(format!(
        "{} is not installed or not on PATH",
        self.program.display()
      )),
      _ => BrieferError::Path(e),
    })?;

    if let Some(input) = stdin {
      if let Some(mut pipe) = child.stdin.take() {
        pipe.write_all(input.as_bytes()).await?;
        pipe.write_all(b"\n").await?;
        pipe.shutdown().await?;
      }
    }

    let output = child.wait_with_output().await?;
    Ok(VaultOutput {
      success: output.status.success(),
      stdout:  String::from_utf8_lossy(&output.stdout).trim().to_string(),
      stderr:  String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
  }
}

/// `bw status` response.
#[derive(Debug, Deserialize)]
struct VaultStatus {
  /// `unauthenticated`, `locked` or `unlocked`
  status: String,
}

/// Folder entry from `bw list folders`.
#[derive(Debug, Deserialize)]
struct VaultFolder {
  id:   Option<String>,
  name: String,
}

/// Item entry from `bw list items`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultItem {
  name:      String,
  #[serde(default)]
  folder_id: Option<String>,
  #[serde(default)]
  login:     Option<VaultLogin>,
  #[serde(default)]
  fields:    Option<Vec<VaultField>>,
  #[serde(default)]
  notes:     Option<String>,
}

#[derive(Debug, Deserialize)]
struct VaultLogin {
  #[serde(default)]
  username: Option<String>,
  #[serde(default)]
  password: Option<String>,
  #[serde(default)]
  uris:     Option<Vec<VaultUri>>,
}

#[derive(Debug, Deserialize)]
struct VaultUri {
  #[serde(default)]
  uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VaultField {
  #[serde(default)]
  name:  Option<String>,
  #[serde(default)]
  value: Option<String>,
}

/// Credential provider backed by a Bitwarden vault.
pub struct BitwardenProvider {
  /// How vault commands are executed
  cli:             Box<dyn VaultCommand>,
  /// Folder items must live in; empty means the whole vault
  folder:          String,
  /// Pre-existing session token to try first
  session_token:   Option<String>,
  /// Master password used for unlocking
  master_password: Option<String>,
  /// Session for this run, or why the vault is unusable. Settled once per run.
  session:         Option<std::result::Result<SessionHandle, String>>,
  /// Resolved folder id, once looked up
  folder_id:       Option<Option<String>>,
}

impl BitwardenProvider {
  /// Provider scoped to `folder` with no session or password configured.
  pub fn new(cli: impl VaultCommand + 'static, folder: impl Into<String>) -> Self {
    Self {
      cli:             Box::new(cli),
      folder:          folder.into(),
      session_token:   None,
      master_password: None,
      session:         None,
      folder_id:       None,
    }
  }

  /// Picks up `BW_SESSION` and `BW_PASSWORD` from the process environment.
  pub fn from_env(cli: impl VaultCommand + 'static, folder: impl Into<String>) -> Self {
    let mut provider = Self::new(cli, folder);
    provider.session_token = std::env::var("BW_SESSION").ok().filter(|s| !s.trim().is_empty());
    provider.master_password = std::env::var("BW_PASSWORD").ok().filter(|s| !s.is_empty());
    provider
  }

  /// Tries this session token before unlocking.
  pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
    self.session_token = Some(token.into());
    self
  }

  /// Master password to unlock with when no session is usable.
  pub fn with_master_password(mut self, password: impl Into<String>) -> Self {
    self.master_password = Some(password.into());
    self
  }

  /// Asks the vault for its status, attaching `session` when given.
  async fn probe_status(&self, session: Option<&str>) -> Result<String> {
    let output = tokio::time::timeout(PROBE_TIMEOUT, self.cli.run(&["status"], session, None))
      .await
      .map_err(|_| {
        BrieferError::SecretBackendUnavailable(format!(
          "status probe timed out after {} seconds",
          PROBE_TIMEOUT.as_secs()
        ))
      })??;

    if !output.success {
      return Err(BrieferError::SecretBackendUnavailable(format!(
        "status probe failed: {}",
        output.stderr
      )));
    }
    let status: VaultStatus = serde_json::from_str(&output.stdout).map_err(|e| {
      BrieferError::SecretBackendUnavailable(format!("unreadable status response: {e}"))
    })?;
    trace!("Vault status: {}", status.status);
    Ok(status.status)
  }

  /// Checks a session token: a format check, then one live status probe.
  ///
  /// # Errors
  ///
  /// [`BrieferError::SessionInvalid`] when the token is too short (no probe is made), the probe
  /// fails, or the vault does not report itself unlocked.
  pub async fn validate_session(&self, token: &str) -> Result<SessionHandle> {
    let token = token.trim();
    if token.len() < MIN_SESSION_LENGTH {
      return Err(BrieferError::SessionInvalid("session token is malformed".to_string()));
    }

    match self.probe_status(Some(token)).await {
      Ok(status) if status == "unlocked" => Ok(SessionHandle(token.to_string())),
      Ok(status) => Err(BrieferError::SessionInvalid(format!("vault reports status \"{status}\""))),
      Err(e) => Err(BrieferError::SessionInvalid(e.to_string())),
    }
  }

  /// Unlocks the vault with the master password over standard input.
  async fn unlock(&self) -> Result<SessionHandle> {
    let Some(secret) = self.master_password.as_deref() else {
      return Err(BrieferError::SecretBackendUnavailable(
        "vault is locked and BW_PASSWORD is not set".to_string(),
      ));
    };

    info!("Unlocking vault");
    let output =
      match tokio::time::timeout(UNLOCK_TIMEOUT, self.cli.run(&["unlock", "--raw"], None, Some(secret)))
        .await
      {
        Ok(result) => result?,
        Err(_) => return Err(BrieferError::UnlockTimeout(UNLOCK_TIMEOUT.as_secs())),
      };

    if !output.success || output.stdout.is_empty() {
      return Err(BrieferError::SecretBackendUnavailable(format!(
        "vault unlock failed: {}",
        output.stderr
      )));
    }
    self.validate_session(&output.stdout).await
  }

  /// Returns the session for this run, validating or unlocking on first use.
  ///
  /// An unusable vault is remembered so later items fail over without probing or unlocking again.
  async fn ensure_session(&mut self) -> Result<SessionHandle> {
    match &self.session {
      Some(Ok(session)) => return Ok(session.clone()),
      Some(Err(reason)) => return Err(BrieferError::SecretBackendUnavailable(reason.clone())),
      None => {},
    }

    match self.open_session().await {
      Ok(session) => {
        debug!("Vault session ready");
        self.session = Some(Ok(session.clone()));
        Ok(session)
      },
      Err(e) => Err(self.remember_unavailable(e)),
    }
  }

  /// Marks the vault unusable for the rest of the run when `e` allows falling back.
  fn remember_unavailable(&mut self, e: BrieferError) -> BrieferError {
    if let BrieferError::SecretBackendUnavailable(reason) = &e {
      warn!("Vault unavailable for this run: {}", reason);
      self.session = Some(Err(reason.clone()));
    }
    e
  }

  /// Validates the existing session or unlocks a new one.
  async fn open_session(&mut self) -> Result<SessionHandle> {
    let session = match self.session_token.take() {
      Some(token) => match self.validate_session(&token).await {
        Ok(session) => session,
        Err(e) if self.master_password.is_some() => {
          warn!("Existing vault session rejected ({}); unlocking again", e);
          self.unlock().await?
        },
        Err(e) => return Err(e),
      },
      None => match self.probe_status(None).await?.as_str() {
        "unauthenticated" => {
          return Err(BrieferError::SecretBackendUnavailable(
            "not logged in to the vault".to_string(),
          ))
        },
        _ => self.unlock().await?,
      },
    };
    Ok(session)
  }

  /// Runs a listing command and fails over on any problem.
  async fn list(&self, args: &[&str], session: &SessionHandle) -> Result<String> {
    let output = self.cli.run(args, Some(session.as_str()), None).await?;
    if !output.success {
      return Err(BrieferError::SecretBackendUnavailable(format!(
        "`bw {}` failed: {}",
        args.join(" "),
        output.stderr
      )));
    }
    Ok(output.stdout)
  }

  /// Id of the configured folder, or `None` when unscoped.
  async fn folder_id(&mut self, session: &SessionHandle) -> Result<Option<String>> {
    if let Some(id) = &self.folder_id {
      return Ok(id.clone());
    }
    if self.folder.is_empty() {
      self.folder_id = Some(None);
      return Ok(None);
    }

    let raw = self.list(&["list", "folders", "--search", &self.folder], session).await?;
    let folders: Vec<VaultFolder> = serde_json::from_str(&raw)?;
    let id = folders
      .into_iter()
      .find(|f| f.name == self.folder)
      .and_then(|f| f.id)
      .ok_or_else(|| {
        BrieferError::SecretBackendUnavailable(format!("vault folder \"{}\" not found", self.folder))
      })?;

    self.folder_id = Some(Some(id.clone()));
    Ok(Some(id))
  }
}

/// Which logical field the login password fills for `item`.
fn password_slot(item: CredentialItem) -> CredentialField {
  match item {
    CredentialItem::Canoe => CredentialField::ClientSecret,
    CredentialItem::Claude => CredentialField::ApiKey,
    CredentialItem::Notion => CredentialField::Token,
    CredentialItem::GoogleSheets => CredentialField::CredentialsJson,
  }
}

/// Logical field of `item` called `name`, if any.
fn field_named(item: CredentialItem, name: &str) -> Option<CredentialField> {
  let name = name.trim().to_lowercase();
  item.fields().iter().copied().find(|f| f.name() == name)
}

/// Maps vault slots onto the logical fields of `item`.
fn map_fields(item: CredentialItem, entry: VaultItem) -> BTreeMap<CredentialField, String> {
  let mut values = BTreeMap::new();
  let wants = |field: CredentialField| item.fields().contains(&field);

  if let Some(login) = entry.login {
    if let Some(username) = login.username.filter(|_| wants(CredentialField::ClientId)) {
      values.insert(CredentialField::ClientId, username);
    }
    if let Some(password) = login.password {
      values.insert(password_slot(item), password);
    }
    if let Some(uri) = login
      .uris
      .unwrap_or_default()
      .into_iter()
      .find_map(|u| u.uri)
      .filter(|_| wants(CredentialField::BaseUrl))
    {
      values.insert(CredentialField::BaseUrl, uri);
    }
  }

  for line in entry.notes.as_deref().unwrap_or_default().lines() {
    if let Some((key, value)) = line.split_once(':') {
      if let Some(field) = field_named(item, key) {
        values.insert(field, value.trim().to_string());
      }
    }
  }

  for custom in entry.fields.unwrap_or_default() {
    if let (Some(name), Some(value)) = (custom.name, custom.value) {
      if let Some(field) = field_named(item, &name) {
        values.insert(field, value);
      }
    }
  }

  values
}

#[async_trait]
impl CredentialProvider for BitwardenProvider {
  fn name(&self) -> &'static str { "bitwarden" }

  async fn fetch(&mut self, item: CredentialItem) -> Result<Credentials> {
    let session = self.ensure_session().await?;
    let folder_id = match self.folder_id(&session).await {
      Ok(folder_id) => folder_id,
      Err(e) => return Err(self.remember_unavailable(e)),
    };

    let raw = self.list(&["list", "items", "--search", item.vault_name()], &session).await?;
    let mut candidates: Vec<VaultItem> = serde_json::from_str::<Vec<VaultItem>>(&raw)?
      .into_iter()
      .filter(|entry| folder_id.is_none() || entry.folder_id == folder_id)
      .collect();

    let position = candidates
      .iter()
      .position(|entry| entry.name == item.vault_name())
      .or_else(|| (!candidates.is_empty()).then_some(0));
    let Some(position) = position else {
      return Err(BrieferError::CredentialNotFound {
        item:    item.to_string(),
        missing: item.fields().iter().map(|f| f.name().to_string()).collect(),
      });
    };

    let entry = candidates.swap_remove(position);
    debug!("Found vault item \"{}\" for {}", entry.name, item);
    Credentials::from_values(item, map_fields(item, entry))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;

  /// One recorded vault invocation.
  #[derive(Debug, Clone)]
  struct Call {
    args:    Vec<String>,
    session: Option<String>,
    stdin:   Option<String>,
  }

  /// Scripted vault: answers by the joined argument list and records every call.
  #[derive(Clone, Default)]
  struct FakeVault {
    responses:    Arc<Mutex<BTreeMap<String, VaultOutput>>>,
    calls:        Arc<Mutex<Vec<Call>>>,
    hang_unlock:  bool,
    missing:      bool,
  }

  impl FakeVault {
    fn respond(self, args: &str, output: VaultOutput) -> Self {
      self.responses.lock().unwrap().insert(args.to_string(), output);
      self
    }

    fn calls(&self) -> Vec<Call> { self.calls.lock().unwrap().clone() }
  }

  #[async_trait]
  impl VaultCommand for FakeVault {
    async fn run(
      &self,
      args: &[&str],
      session: Option<&str>,
      stdin: Option<&str>,
    ) -> Result<VaultOutput> {
      self.calls.lock().unwrap().push(Call {
        args:    args.iter().map(|a| a.to_string()).collect(),
        session: session.map(str::to_string),
        stdin:   stdin.map(str::to_string),
      });
      if self.missing {
        return Err(BrieferError::SecretBackendUnavailable("bw is not installed".into()));
      }
      if self.hang_unlock && args.first() == Some(&"unlock") {
        tokio::time::sleep(Duration::from_secs(3600)).await;
      }
      let key = args.join(" ");
      Ok(self.responses.lock().unwrap().get(&key).cloned().unwrap_or_else(|| VaultOutput::failed("unexpected")))
    }
  }

  const SESSION: &str = "session-token-0123456789";

  fn unlocked_vault() -> FakeVault {
    FakeVault::default()
      .respond("status", VaultOutput::ok(r#"{"status":"unlocked"}"#))
      .respond("list folders --search Axiom", VaultOutput::ok(r#"[{"id":"f1","name":"Axiom"}]"#))
      .respond(
        "list items --search Canoe",
        VaultOutput::ok(
          r#"[
            {"name":"Canoe","folderId":"other","login":{"username":"wrong"}},
            {"name":"Canoe","folderId":"f1","login":{"username":"client-1","password":"hunter2",
              "uris":[{"uri":"https://canoe.example.com"}]}}
          ]"#,
        ),
      )
      .respond(
        "list items --search Notion",
        VaultOutput::ok(
          r#"[{"name":"Notion","folderId":"f1","login":{"password":"secret_notion"},
               "notes":"Integration for reports\ndatabase_id: abc123"}]"#,
        ),
      )
      .respond(
        "list items --search GoogleSheets",
        VaultOutput::ok(
          r#"[{"name":"GoogleSheets","folderId":"f1","login":null,
               "fields":[{"name":"credentials_json","value":"{}"},
                         {"name":"spreadsheet_id","value":"sheet-9"}]}]"#,
        ),
      )
      .respond("list items --search Claude", VaultOutput::ok("[]"))
  }

  #[tokio::test]
  async fn test_short_session_rejected_without_probe() {
    let vault = FakeVault::default();
    let provider = BitwardenProvider::new(vault.clone(), "Axiom");

    let result = provider.validate_session("abcde").await;
    assert!(matches!(result, Err(BrieferError::SessionInvalid(_))));
    assert!(vault.calls().is_empty());
  }

  #[tokio::test]
  async fn test_existing_session_is_probed_once() {
    let vault = unlocked_vault();
    let mut provider = BitwardenProvider::new(vault.clone(), "Axiom").with_session_token(SESSION);

    let canoe = provider.fetch(CredentialItem::Canoe).await.unwrap();
    assert_eq!(canoe.get(CredentialField::ClientId).unwrap(), "client-1");
    assert_eq!(canoe.get(CredentialField::ClientSecret).unwrap(), "hunter2");
    assert_eq!(canoe.get(CredentialField::BaseUrl).unwrap(), "https://canoe.example.com");

    provider.fetch(CredentialItem::Notion).await.unwrap();
    let status_calls = vault.calls().iter().filter(|c| c.args == ["status"]).count();
    assert_eq!(status_calls, 1);
    assert!(vault.calls().iter().all(|c| c.session.as_deref() == Some(SESSION)));
  }

  #[tokio::test]
  async fn test_unlock_uses_stdin_only() {
    let vault = unlocked_vault().respond("unlock --raw", VaultOutput::ok(SESSION));
    let mut provider =
      BitwardenProvider::new(vault.clone(), "Axiom").with_master_password("correct horse");

    provider.fetch(CredentialItem::Notion).await.unwrap();

    let calls = vault.calls();
    let unlock = calls.iter().find(|c| c.args[0] == "unlock").unwrap();
    assert_eq!(unlock.stdin.as_deref(), Some("correct horse"));
    assert!(unlock.session.is_none());
    assert!(calls.iter().all(|c| !c.args.iter().any(|a| a.contains("correct horse"))));
    assert!(calls.iter().filter(|c| c.args[0] != "unlock").all(|c| c.stdin.is_none()));
  }

  #[tokio::test(start_paused = true)]
  async fn test_unlock_timeout() {
    let mut vault = FakeVault::default().respond("status", VaultOutput::ok(r#"{"status":"locked"}"#));
    vault.hang_unlock = true;
    let mut provider = BitwardenProvider::new(vault, "Axiom").with_master_password("pw");

    assert!(matches!(
      provider.fetch(CredentialItem::Canoe).await,
      Err(BrieferError::UnlockTimeout(30))
    ));
  }

  #[tokio::test]
  async fn test_locked_without_password_is_unavailable() {
    let vault = FakeVault::default().respond("status", VaultOutput::ok(r#"{"status":"locked"}"#));
    let mut provider = BitwardenProvider::new(vault, "Axiom");
    let err = provider.fetch(CredentialItem::Canoe).await.unwrap_err();
    assert!(err.allows_fallback());
  }

  #[tokio::test]
  async fn test_rejected_session_without_password_is_fatal() {
    let vault = FakeVault::default().respond("status", VaultOutput::ok(r#"{"status":"locked"}"#));
    let mut provider = BitwardenProvider::new(vault, "Axiom").with_session_token(SESSION);
    let err = provider.fetch(CredentialItem::Canoe).await.unwrap_err();
    assert!(matches!(err, BrieferError::SessionInvalid(_)));
    assert!(!err.allows_fallback());
  }

  #[tokio::test]
  async fn test_field_mapping_from_notes_and_custom_fields() {
    let mut provider = BitwardenProvider::new(unlocked_vault(), "Axiom").with_session_token(SESSION);

    let notion = provider.fetch(CredentialItem::Notion).await.unwrap();
    assert_eq!(notion.get(CredentialField::Token).unwrap(), "secret_notion");
    assert_eq!(notion.get(CredentialField::DatabaseId).unwrap(), "abc123");

    let sheets = provider.fetch(CredentialItem::GoogleSheets).await.unwrap();
    assert_eq!(sheets.get(CredentialField::SpreadsheetId).unwrap(), "sheet-9");

    assert!(matches!(
      provider.fetch(CredentialItem::Claude).await,
      Err(BrieferError::CredentialNotFound { .. })
    ));
  }

  #[tokio::test]
  async fn test_failed_unlock_is_not_retried() {
    let vault = FakeVault::default()
      .respond("status", VaultOutput::ok(r#"{"status":"locked"}"#))
      .respond("unlock --raw", VaultOutput::failed("Invalid master password."));
    let mut provider = BitwardenProvider::new(vault.clone(), "Axiom").with_master_password("wrong");

    for item in [CredentialItem::Canoe, CredentialItem::Claude, CredentialItem::Notion] {
      let err = provider.fetch(item).await.unwrap_err();
      assert!(err.allows_fallback());
    }

    let calls = vault.calls();
    assert_eq!(calls.iter().filter(|c| c.args == ["status"]).count(), 1);
    assert_eq!(calls.iter().filter(|c| c.args[0] == "unlock").count(), 1);
  }

  #[tokio::test]
  async fn test_missing_folder_is_looked_up_once() {
    let vault = unlocked_vault().respond("list folders --search Reports", VaultOutput::ok("[]"));
    let mut provider = BitwardenProvider::new(vault.clone(), "Reports").with_session_token(SESSION);

    for item in [CredentialItem::Canoe, CredentialItem::Notion] {
      match provider.fetch(item).await {
        Err(BrieferError::SecretBackendUnavailable(reason)) => assert!(reason.contains("Reports")),
        other => panic!("expected the vault to be unavailable, got {other:?}"),
      }
    }

    let calls = vault.calls();
    assert_eq!(calls.iter().filter(|c| c.args[0] == "list").count(), 1);
    assert_eq!(calls.iter().filter(|c| c.args == ["status"]).count(), 1);
  }

  #[tokio::test]
  async fn test_missing_cli_falls_back_to_environment() {
    let vault = FakeVault { missing: true, ..FakeVault::default() };
    let env: BTreeMap<&str, &str> = [("ANTHROPIC_API_KEY", "sk-ant-test")].into_iter().collect();
    let mut resolver = CredentialResolver::new()
      .with_provider(BitwardenProvider::new(vault, "Axiom"))
      .with_provider(EnvironmentProvider::with_lookup(move |name| {
        env.get(name).map(|v| v.to_string())
      }));

    let claude = resolver.resolve(CredentialItem::Claude).await.unwrap();
    assert_eq!(claude.get(CredentialField::ApiKey).unwrap(), "sk-ant-test");
  }

  #[traced_test]
  #[tokio::test]
  async fn test_item_missing_from_vault_uses_environment() {
    let vault = unlocked_vault().respond("list items --search Notion", VaultOutput::ok("[]"));
    let env: BTreeMap<&str, &str> =
      [("NOTION_TOKEN", "secret_env_notion"), ("NOTION_DATABASE_ID", "db-from-env")]
        .into_iter()
        .collect();
    let mut resolver = CredentialResolver::new()
      .with_provider(BitwardenProvider::new(vault, "Axiom").with_session_token(SESSION))
      .with_provider(EnvironmentProvider::with_lookup(move |name| {
        env.get(name).map(|v| v.to_string())
      }));

    let notion = resolver.resolve(CredentialItem::Notion).await.unwrap();
    assert_eq!(notion.get(CredentialField::Token).unwrap(), "secret_env_notion");
    assert_eq!(notion.get(CredentialField::DatabaseId).unwrap(), "db-from-env");
    assert!(!logs_contain("secret_env_notion"));
  }
}
