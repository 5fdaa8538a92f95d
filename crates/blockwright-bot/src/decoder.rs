//! `!`-prefixed chat command decoder.
//!
//! Chat arrives on stdin as `<sender>: <message>` for global chat and
//! `[WHISPER] <sender>: <message>` for private messages. Only messages that
//! start with `!` are addressed to the agent.

use std::str::FromStr;

use rust_decimal::Decimal;

use blockwright_core::{Command, CommandDecoder, DecodeError, StartRequest};
use blockwright_types::{CompileOptions, ImageLayout, PaletteSelection, PlanSource, Requester};

/// Prefix of whispered chat lines.
const WHISPER_PREFIX: &str = "[WHISPER] ";

/// Sender used for stdin lines without a `<sender>:` prefix.
pub const CONSOLE_SENDER: &str = "console";

/// History entries shown when `!history` has no count.
const DEFAULT_HISTORY_LIMIT: usize = 5;

/// A decoded chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// A command for the agent session.
    Core(Command),
    /// Download an image, then start building it.
    Download {
        /// Remote address.
        url: String,
        /// Compile options for the downloaded image.
        options: CompileOptions,
        /// Placement rate multiplier.
        speed_factor: Option<Decimal>,
        /// Who asked.
        requester: Requester,
    },
    /// Print the command reference.
    Help,
}

/// Split a chat line into its sender and message.
pub fn split_chat_line(line: &str) -> (Requester, &str) {
    let (private, rest) = line
        .strip_prefix(WHISPER_PREFIX)
        .map_or((false, line), |rest| (true, rest));
    let Some((name, message)) = rest
        .split_once(": ")
        .filter(|(name, _)| !name.is_empty() && !name.contains(char::is_whitespace))
    else {
        return (Requester::public(CONSOLE_SENDER), line.trim());
    };
    let requester = if private {
        Requester::private(name)
    } else {
        Requester::public(name)
    };
    (requester, message.trim())
}

/// Decoder for `!build`, `!schem`, `!url` and the session commands.
#[derive(Debug, Clone, Default)]
pub struct BangDecoder {
    palette: PaletteSelection,
    layout: ImageLayout,
}

impl BangDecoder {
    /// Decoder that fills in `palette` and `layout` when a command omits them.
    pub const fn new(palette: PaletteSelection, layout: ImageLayout) -> Self {
        Self { palette, layout }
    }

    fn image_args<'a>(
        &self,
        args: impl Iterator<Item = &'a str>,
    ) -> Result<(CompileOptions, Option<Decimal>), DecodeError> {
        let mut options = CompileOptions {
            palette: self.palette,
            layout: self.layout,
            ..CompileOptions::default()
        };
        let mut palette_given = false;
        let mut size_given = false;
        let mut speed = None;
        for arg in args {
            if !palette_given && !size_given && speed.is_none() {
                if let Ok(palette) = PaletteSelection::from_str(arg) {
                    options.palette = palette;
                    palette_given = true;
                    continue;
                }
            }
            if !size_given && speed.is_none() {
                if let Some((width, height)) = parse_size(arg) {
                    options.width = Some(width);
                    options.height = height;
                    size_given = true;
                    continue;
                }
            }
            if speed.is_none() {
                speed = Some(parse_speed(arg)?);
                continue;
            }
            return Err(DecodeError::Invalid {
                what: "argument",
                input: arg.to_owned(),
            });
        }
        Ok((options, speed))
    }
}

impl CommandDecoder for BangDecoder {
    type Command = ChatCommand;

    fn decode(
        &self,
        line: &str,
        sender: &Requester,
    ) -> Option<Result<Self::Command, DecodeError>> {
        let body = line.trim().strip_prefix('!')?;
        let mut words = body.split_whitespace();
        let verb = words.next()?.to_ascii_lowercase();
        let result = match verb.as_str() {
            "build" | "img" => {
                const USAGE: &str = "!build <file> [palette] [WIDTHxHEIGHT] [speed]";
                words
                    .next()
                    .ok_or(DecodeError::Usage { usage: USAGE })
                    .and_then(|file| {
                        let (options, speed_factor) = self.image_args(words)?;
                        Ok(ChatCommand::Core(Command::Start(StartRequest {
                            options,
                            speed_factor,
                            ..StartRequest::new(
                                PlanSource::Image {
                                    file: file.to_owned(),
                                    url: None,
                                },
                                sender.clone(),
                            )
                        })))
                    })
            }
            "schem" => {
                const USAGE: &str = "!schem <file> [speed 0.1-5.0] [chests:true|false]";
                match (words.next(), words.next(), words.next(), words.next()) {
                    (Some(file), speed, chests, None) => {
                        blueprint_request(file, speed, chests, sender).map(ChatCommand::Core)
                    }
                    _ => Err(DecodeError::Usage { usage: USAGE }),
                }
            }
            "url" => {
                const USAGE: &str = "!url <url> [palette] [WIDTHxHEIGHT] [speed]";
                words
                    .next()
                    .ok_or(DecodeError::Usage { usage: USAGE })
                    .and_then(|url| {
                        let (options, speed_factor) = self.image_args(words)?;
                        Ok(ChatCommand::Download {
                            url: url.to_owned(),
                            options,
                            speed_factor,
                            requester: sender.clone(),
                        })
                    })
            }
            "pause" => Ok(ChatCommand::Core(Command::Pause)),
            "resume" => Ok(ChatCommand::Core(Command::Resume(sender.clone()))),
            "stop" | "cancel" => Ok(ChatCommand::Core(Command::Stop)),
            "status" | "progress" => Ok(ChatCommand::Core(Command::Status)),
            "list" => Ok(ChatCommand::Core(Command::List)),
            "history" => words.next().map_or(
                Ok(ChatCommand::Core(Command::History {
                    limit: DEFAULT_HISTORY_LIMIT,
                })),
                |n| {
                    n.parse::<usize>()
                        .ok()
                        .filter(|limit| *limit > 0)
                        .map(|limit| ChatCommand::Core(Command::History { limit }))
                        .ok_or_else(|| DecodeError::Invalid {
                            what: "history count",
                            input: n.to_owned(),
                        })
                },
            ),
            "inventory" | "materials" => Ok(ChatCommand::Core(Command::Inventory)),
            "help" => Ok(ChatCommand::Help),
            _ => return None,
        };
        Some(result)
    }
}

/// Blueprint builds restock from chests unless told `chests:false`.
fn blueprint_request(
    file: &str,
    speed: Option<&str>,
    chests: Option<&str>,
    sender: &Requester,
) -> Result<Command, DecodeError> {
    let speed_factor = speed.map(parse_speed).transpose()?;
    let use_containers = chests.map_or(Ok(true), parse_chests)?;
    Ok(Command::Start(StartRequest {
        speed_factor,
        use_containers,
        ..StartRequest::new(
            PlanSource::Blueprint {
                file: file.to_owned(),
            },
            sender.clone(),
        )
    }))
}

/// `chests:true`, `chests:false`, or the bare value.
fn parse_chests(arg: &str) -> Result<bool, DecodeError> {
    let lower = arg.to_ascii_lowercase();
    match lower.strip_prefix("chests:").unwrap_or(lower.as_str()) {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(DecodeError::Invalid {
            what: "chests",
            input: arg.to_owned(),
        }),
    }
}

/// `64` or `64x48`.
fn parse_size(arg: &str) -> Option<(u32, Option<u32>)> {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match arg.to_ascii_lowercase().split_once('x') {
        Some((w, h)) if digits(w) && digits(h) => Some((w.parse().ok()?, Some(h.parse().ok()?))),
        None if digits(arg) => Some((arg.parse().ok()?, None)),
        _ => None,
    }
}

fn parse_speed(arg: &str) -> Result<Decimal, DecodeError> {
    Decimal::from_str(arg).map_err(|_parse| DecodeError::Invalid {
        what: "speed",
        input: arg.to_owned(),
    })
}
