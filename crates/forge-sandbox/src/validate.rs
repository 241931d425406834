use forge_core::{ForgeError, ForgeResult, SandboxErrorKind};

const MAX_COMMAND_LEN: usize = 8192;
const MAX_PATH_LEN: usize = 4096;

/// Rejects empty commands, commands over the length cap, and commands
/// containing null bytes. Shell metacharacters are otherwise accepted: the
/// provider runs commands via `sh -c`, and restricting specific characters
/// would break legitimate use (pipes, redirects) without closing the
/// underlying trust boundary — that boundary is the container itself.
pub fn validate_command(cmd: &str) -> ForgeResult<()> {
    if cmd.trim().is_empty() {
        return Err(ForgeError::Validation("empty command rejected".into()));
    }
    if cmd.len() > MAX_COMMAND_LEN {
        return Err(ForgeError::Validation(format!(
            "command exceeds max length of {MAX_COMMAND_LEN} bytes"
        )));
    }
    if cmd.contains('\0') {
        return Err(ForgeError::Validation("command contains null bytes".into()));
    }
    Ok(())
}

/// Rejects paths that escape the sandbox working directory via `..`
/// traversal, absolute paths outside the working directory, or null bytes.
pub fn validate_path(path: &str) -> ForgeResult<()> {
    if path.is_empty() {
        return Err(ForgeError::Validation("empty path rejected".into()));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(ForgeError::Validation(format!(
            "path exceeds max length of {MAX_PATH_LEN} bytes"
        )));
    }
    if path.contains('\0') {
        return Err(ForgeError::Validation("path contains null bytes".into()));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(ForgeError::Validation(format!(
            "path escapes sandbox root: {path}"
        )));
    }
    Ok(())
}

/// Wraps a provider error as a [`ForgeError::Sandbox`] of the given subkind.
pub fn sandbox_error(kind: SandboxErrorKind, message: impl Into<String>) -> ForgeError {
    ForgeError::Sandbox {
        kind,
        message: message.into(),
    }
}
