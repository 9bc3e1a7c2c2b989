//! # Typed Host Commands
//!
//! One async method per command the native host understands. Every method
//! serializes its arguments positionally and forwards to `Bridge::call`, so
//! the typed surface and the raw chokepoint can never disagree on the wire.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::bridge::Bridge;
use crate::bridge::Error;
use crate::bridge::Result;
use crate::channel::Channel;
use crate::channel::Typed;
use crate::channel::UI_EVENTS;
use crate::channel::WINDOW_EVENTS;

/// Character classes and length for password generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    pub characters: bool,
    pub digits: bool,
    pub punctuation: bool,
    pub special: bool,
    pub length: u32,
}

/// A mnemonic phrase and the password derived from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseData {
    pub phrase: Vec<String>,
    pub password: String,
}

/// Values pushed on the `window-events` channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowEvent {
    Minimized,
    Focus,
    Blur,
}

/// Values pushed on the `ui-events` channel: where the window should open.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenLocation {
    Auto,
    Generate,
    Retrieve,
}

macro_rules! host_commands {
    ($(
        $(#[$meta:meta])*
        fn $method:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty = $command:literal;
    )*) => {
        impl HostApi {
            $(
                $(#[$meta])*
                pub async fn $method(&self, $($arg: $ty),*) -> Result<$ret> {
                    let args = vec![$(serde_json::to_value($arg).map_err(Error::Encode)?),*];
                    self.bridge.call_as($command, args).await
                }
            )*
        }

        /// Wire names of every typed command, in declaration order.
        pub const COMMANDS: &[&str] = &[$($command),*];
    };
}

/// Typed client for the host's command surface.
#[derive(Clone)]
pub struct HostApi {
    bridge: Bridge,
}

impl HostApi {
    pub fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn establish_channel(&self, name: impl Into<String>) -> Channel {
        self.bridge.establish_channel(name)
    }

    /// Subscribes to window focus and minimize notifications.
    pub fn window_events(&self) -> Typed<WindowEvent> {
        self.establish_channel(WINDOW_EVENTS).subscribe().typed()
    }

    /// Subscribes to open-location requests.
    pub fn ui_events(&self) -> Typed<OpenLocation> {
        self.establish_channel(UI_EVENTS).subscribe().typed()
    }
}

host_commands! {
    fn generate_mnemonic_phrase(config: &GeneratorConfig) -> PhraseData = "generateMnemonicPhrase";
    fn from_mnemonic_phrase(phrase: &[String], config: &GeneratorConfig) -> PhraseData = "fromMnemonicPhrase";
    fn check_checksum(phrase: &[String]) -> bool = "checkChecksum";
    /// Tells the host the web layer finished booting.
    fn set_initialized() -> () = "setInitialized";
    /// The newline-separated word list the phrases are drawn from.
    fn get_wordlist() -> String = "getWordlist";
    fn window_drag_move() -> () = "windowDragMove";
    fn window_show_sys_menu(x: i32, y: i32) -> () = "windowShowSysMenu";
    fn window_close() -> () = "windowClose";
    fn window_minimize() -> () = "windowMinimize";
    fn window_set_title(title: &str) -> () = "windowSetTitle";
    fn show_message_box(config: &Value) -> Value = "showMessageBox";
    /// Reads a dotted config path; `null` when unset.
    fn config_get_property(path: &[String]) -> Value = "configGetProperty";
    fn config_set_property(path: &[String], value: &Value) -> () = "configSetProperty";
    fn config_observe_property(path: &[String]) -> () = "configObserveProperty";
    fn config_is_file() -> bool = "configIsFile";
}
