use crate::Result;
use camino::Utf8PathBuf;
use clap::ValueEnum;
use ohno::bail;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Speech-recognition model the worker should load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, ValueEnum, Serialize, Deserialize)]
pub enum WhisperModel {
    #[strum(serialize = "tiny")]
    #[value(name = "tiny")]
    #[serde(rename = "tiny")]
    Tiny,

    #[strum(serialize = "base")]
    #[value(name = "base")]
    #[serde(rename = "base")]
    Base,

    #[default]
    #[strum(serialize = "small")]
    #[value(name = "small")]
    #[serde(rename = "small")]
    Small,

    #[strum(serialize = "medium")]
    #[value(name = "medium")]
    #[serde(rename = "medium")]
    Medium,

    #[strum(serialize = "large-v1")]
    #[value(name = "large-v1")]
    #[serde(rename = "large-v1")]
    LargeV1,

    #[strum(serialize = "large-v2")]
    #[value(name = "large-v2")]
    #[serde(rename = "large-v2")]
    LargeV2,

    #[strum(serialize = "large-v3")]
    #[value(name = "large-v3")]
    #[serde(rename = "large-v3")]
    LargeV3,

    #[strum(serialize = "large-v3-turbo")]
    #[value(name = "large-v3-turbo")]
    #[serde(rename = "large-v3-turbo")]
    LargeV3Turbo,
}

/// Spoken language of the input, or automatic detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, ValueEnum, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[value(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Let the worker detect the language
    #[default]
    Auto,
    /// English
    En,
    /// Chinese
    Zh,
    /// Japanese
    Ja,
    /// Korean
    Ko,
}

impl Language {
    /// Code passed to the worker with `-l`, or `None` for automatic detection.
    #[must_use]
    pub const fn code(self) -> Option<&'static str> {
        match self {
            Self::Auto => None,
            Self::En => Some("en"),
            Self::Zh => Some("zh"),
            Self::Ja => Some("ja"),
            Self::Ko => Some("ko"),
        }
    }
}

/// Everything the worker needs to know about one transcription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionOptions {
    pub input: Utf8PathBuf,
    pub model: WhisperModel,
    pub language: Language,

    /// Translate the transcript to English.
    pub translate: bool,

    /// Use the OpenAI backend for translation. Only set when a credential is available.
    pub openai: bool,
}

impl TranscriptionOptions {
    #[must_use]
    pub fn new(input: impl Into<Utf8PathBuf>) -> Self {
        Self {
            input: input.into(),
            model: WhisperModel::default(),
            language: Language::default(),
            translate: false,
            openai: false,
        }
    }

    /// Arguments that follow the worker executable:
    /// `<input> --model <model> [-l <code>] [-t] [--openai]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input path is empty.
    pub fn worker_args(&self) -> Result<Vec<String>> {
        if self.input.as_str().trim().is_empty() {
            bail!("no input file was given");
        }

        let mut args = vec![self.input.to_string(), "--model".to_string(), self.model.to_string()];

        if let Some(code) = self.language.code() {
            args.push("-l".to_string());
            args.push(code.to_string());
        }

        if self.translate {
            args.push("-t".to_string());
        }

        if self.openai {
            args.push("--openai".to_string());
        }

        Ok(args)
    }

    /// Full command line: `worker` followed by [`worker_args`](Self::worker_args).
    ///
    /// # Errors
    ///
    /// Returns an error if `worker` is empty or the input path is empty.
    pub fn command_line(&self, worker: &[String]) -> Result<Vec<String>> {
        if worker.first().is_none_or(|program| program.trim().is_empty()) {
            bail!("the worker command is empty");
        }

        let mut command = worker.to_vec();
        command.extend(self.worker_args()?);
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> Vec<String> {
        vec!["python".to_string(), "-u".to_string(), "autosub.py".to_string()]
    }

    #[test]
    fn test_minimal_command_line() {
        let options = TranscriptionOptions::new("talk.mp4");
        assert_eq!(
            options.command_line(&worker()).unwrap(),
            ["python", "-u", "autosub.py", "talk.mp4", "--model", "small"]
        );
    }

    #[test]
    fn test_auto_language_omits_flag() {
        let options = TranscriptionOptions {
            language: Language::Auto,
            ..TranscriptionOptions::new("a.wav")
        };
        assert!(!options.worker_args().unwrap().contains(&"-l".to_string()));
    }

    #[test]
    fn test_all_flags_in_order() {
        let options = TranscriptionOptions {
            input: "clip.mkv".into(),
            model: WhisperModel::LargeV3Turbo,
            language: Language::Ja,
            translate: true,
            openai: true,
        };
        assert_eq!(
            options.worker_args().unwrap(),
            ["clip.mkv", "--model", "large-v3-turbo", "-l", "ja", "-t", "--openai"]
        );
    }

    #[test]
    fn test_translate_without_openai() {
        let options = TranscriptionOptions {
            language: Language::Ko,
            translate: true,
            ..TranscriptionOptions::new("x.mp3")
        };
        assert_eq!(options.worker_args().unwrap(), ["x.mp3", "--model", "small", "-l", "ko", "-t"]);
    }

    #[test]
    fn test_path_with_spaces_stays_one_argument() {
        let options = TranscriptionOptions::new("my videos/lecture 1.mp4");
        assert_eq!(options.worker_args().unwrap()[0], "my videos/lecture 1.mp4");
    }

    #[test]
    fn test_empty_input_rejected() {
        let _ = TranscriptionOptions::new("").worker_args().unwrap_err();
        let _ = TranscriptionOptions::new("   ").worker_args().unwrap_err();
    }

    #[test]
    fn test_empty_worker_rejected() {
        let options = TranscriptionOptions::new("a.wav");
        let _ = options.command_line(&[]).unwrap_err();
        let _ = options.command_line(&[String::new()]).unwrap_err();
    }

    #[test]
    fn test_model_names() {
        let names: Vec<String> = [
            WhisperModel::Tiny,
            WhisperModel::Base,
            WhisperModel::Small,
            WhisperModel::Medium,
            WhisperModel::LargeV1,
            WhisperModel::LargeV2,
            WhisperModel::LargeV3,
            WhisperModel::LargeV3Turbo,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        assert_eq!(
            names,
            ["tiny", "base", "small", "medium", "large-v1", "large-v2", "large-v3", "large-v3-turbo"]
        );
    }

    #[test]
    fn test_model_from_str() {
        assert_eq!("large-v2".parse::<WhisperModel>().unwrap(), WhisperModel::LargeV2);
        assert!("huge".parse::<WhisperModel>().is_err());
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::Auto.code(), None);
        assert_eq!(Language::En.code(), Some("en"));
        assert_eq!(Language::Zh.code(), Some("zh"));
        assert_eq!("ja".parse::<Language>().unwrap(), Language::Ja);
        assert_eq!(Language::Ko.to_string(), "ko");
    }

    #[test]
    fn test_clap_value_names() {
        assert_eq!(<WhisperModel as ValueEnum>::from_str("large-v3", false), Ok(WhisperModel::LargeV3));
        assert_eq!(<Language as ValueEnum>::from_str("zh", false), Ok(Language::Zh));
    }
}
