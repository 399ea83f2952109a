//! Prompt-layer files: YAML mappings with a required `content:` key.

use std::path::Path;

use conductor_types::ConductorError;

/// Load one prompt layer. Anything other than a mapping with a scalar
/// `content` key is rejected with an error naming the file.
pub fn load_prompt_layer(path: &Path) -> conductor_types::Result<String> {
    let file = path.display().to_string();
    let raw = std::fs::read_to_string(path)?;

    let doc: serde_yaml::Value =
        serde_yaml::from_str(&raw).map_err(|e| ConductorError::PromptLayer {
            file: file.clone(),
            message: format!("invalid YAML: {e}"),
        })?;

    let serde_yaml::Value::Mapping(mapping) = doc else {
        return Err(ConductorError::PromptLayer {
            file,
            message: "must be a YAML mapping".into(),
        });
    };

    let content = mapping
        .get(serde_yaml::Value::String("content".into()))
        .ok_or_else(|| ConductorError::PromptLayer {
            file: file.clone(),
            message: "missing required 'content' key".into(),
        })?;

    match content {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ConductorError::PromptLayer {
            file,
            message: "'content' must be a scalar".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_layer(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_content_string() {
        let (_dir, path) = write_layer("content: |\n  You are a careful reviewer.\n");
        let content = load_prompt_layer(&path).unwrap();
        assert_eq!(content.trim(), "You are a careful reviewer.");
    }

    #[test]
    fn extra_keys_are_ignored() {
        let (_dir, path) = write_layer("name: reviewer\ncontent: Be careful.\n");
        assert_eq!(load_prompt_layer(&path).unwrap(), "Be careful.");
    }

    #[test]
    fn non_mapping_is_rejected_with_filename() {
        let (_dir, path) = write_layer("- just\n- a\n- list\n");
        let err = load_prompt_layer(&path).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("layer.yaml"), "error was: {text}");
        assert!(text.contains("mapping"));
    }

    #[test]
    fn missing_content_key_is_rejected() {
        let (_dir, path) = write_layer("name: reviewer\n");
        let err = load_prompt_layer(&path).unwrap_err();
        assert!(err.to_string().contains("missing required 'content' key"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_prompt_layer(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConductorError::Io(_)));
    }
}
