/// Generates `EventType`, `SessionEventPayload`, `ALL_EVENT_TYPES`, wire-name
/// helpers, domain groups, and typed payload access from one table.
///
/// # Sections
///
/// - **`events`**: `Variant => "wire.name" => PayloadType` rows.
/// - **`domain_groups`**: named boolean methods grouping variants.
///
/// Every generated `EventType` also has an `Unrecognized` variant. Stored
/// discriminants this build does not know deserialize to it instead of
/// failing, and its payload is carried as raw JSON.
macro_rules! define_events {
    (
        events {
            $(
                $(#[doc = $doc:literal])*
                $variant:ident => $wire:literal => $payload_ty:ty
            ),* $(,)?
        }
        domain_groups {
            $(
                $(#[doc = $gdoc:literal])*
                $method:ident => [$($gv:ident),* $(,)?]
            ),* $(,)?
        }
    ) => {
        // ── EventType enum ──────────────────────────────────────────

        /// Discriminator for persisted session events.
        ///
        /// Serializes to its wire string (e.g. `"session.start"`).
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum EventType {
            $(
                $(#[doc = $doc])*
                $variant,
            )*
            /// A discriminant unknown to this build. Never written, ignored
            /// by reconstruction.
            Unrecognized,
        }

        /// Every known event type in definition order (excludes `Unrecognized`).
        pub const ALL_EVENT_TYPES: [EventType; { [$($wire,)*].len() }] = [
            $(EventType::$variant,)*
        ];

        impl EventType {
            /// Canonical wire string.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)*
                    Self::Unrecognized => UNRECOGNIZED_WIRE,
                }
            }

            /// Lenient parse used when reading stored rows.
            #[must_use]
            pub fn from_wire(s: &str) -> Self {
                s.parse().unwrap_or(Self::Unrecognized)
            }

            /// Whether this build knows the type.
            #[must_use]
            pub fn is_recognized(self) -> bool {
                !matches!(self, Self::Unrecognized)
            }

            /// Domain prefix (e.g. `"session"`, `"worktree"`).
            #[must_use]
            pub fn domain(self) -> &'static str {
                let s = self.as_str();
                s.split_once('.').map_or(s, |(d, _)| d)
            }

            $(
                $(#[doc = $gdoc])*
                #[must_use]
                pub fn $method(self) -> bool {
                    matches!(self, $(Self::$gv)|*)
                }
            )*
        }

        impl std::fmt::Display for EventType {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for EventType {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)*
                    _ => Err(format!("unknown event type: {s}")),
                }
            }
        }

        impl serde::Serialize for EventType {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for EventType {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = <std::borrow::Cow<'de, str> as serde::Deserialize<'de>>::deserialize(deserializer)?;
                Ok(Self::from_wire(&s))
            }
        }

        // ── SessionEventPayload enum ────────────────────────────────

        /// Typed payload, obtained via [`SessionEvent::typed_payload()`].
        #[derive(Clone, Debug, PartialEq)]
        pub enum SessionEventPayload {
            $(
                $(#[doc = $doc])*
                $variant($payload_ty),
            )*
            /// Raw payload of an unrecognized event.
            Unrecognized(serde_json::Value),
        }

        impl SessionEvent {
            /// Deserialize the payload into its typed variant (cloning).
            pub fn typed_payload(&self) -> std::result::Result<SessionEventPayload, serde_json::Error> {
                self.clone().into_typed_payload()
            }

            /// Deserialize the payload into its typed variant (consuming).
            #[allow(clippy::too_many_lines)]
            pub fn into_typed_payload(self) -> std::result::Result<SessionEventPayload, serde_json::Error> {
                match self.event_type {
                    $(
                        EventType::$variant => Ok(SessionEventPayload::$variant(
                            serde_json::from_value(self.payload)?,
                        )),
                    )*
                    EventType::Unrecognized => Ok(SessionEventPayload::Unrecognized(self.payload)),
                }
            }
        }
    };
}
