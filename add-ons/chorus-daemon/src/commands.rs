//! Console command grammar: one stdin line is split shell-style and parsed
//! as a clap subcommand.

use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "chorus", about = "Chorus console", disable_version_flag = true)]
struct ConsoleCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Render text locally and play it
    #[command(alias = "say")]
    Speak {
        #[arg(long)]
        lang: Option<String>,
        #[arg(long)]
        accent: Option<String>,
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Like `speak`, with the pre-roll tone first
    Tone {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Render through the synthesis server with a voice model
    Synth {
        model: String,
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Render through the voice-cloning service
    #[command(name = "clone")]
    Cloned {
        voice_id: String,
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Download an audio file and play it
    Play { url: String },
    /// Move the console user into a voice channel
    Join { channel: u64 },
    /// Leave voice; the emptied channel disconnects the session
    Leave,
    #[command(alias = "exit")]
    Quit,
}

pub fn parse(line: &str) -> Result<Command, String> {
    let mut args = shlex::split(line).ok_or("error: invalid quoting")?;
    args.insert(0, "chorus".to_string());
    ConsoleCli::try_parse_from(args)
        .map(|cli| cli.command)
        .map_err(|e| e.to_string())
}

pub fn usage() -> String {
    ConsoleCli::command().render_help().to_string()
}
