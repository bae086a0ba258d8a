//! Channel subscription bookkeeping and permission lookup

use std::collections::HashMap;

use crate::event::MessageCallback;

/// Subscription state of a single channel
///
/// `subscribing` and `subscribed` are mutually exclusive; the setters keep
/// at most one of them set.
#[derive(Clone)]
pub struct ChannelSubscription {
    channel: String,
    subscribing: bool,
    subscribed: bool,
    resubscribe_on_reconnect: bool,
    with_notification: bool,
    callback: MessageCallback,
}

impl std::fmt::Debug for ChannelSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSubscription")
            .field("channel", &self.channel)
            .field("subscribing", &self.subscribing)
            .field("subscribed", &self.subscribed)
            .field("resubscribe_on_reconnect", &self.resubscribe_on_reconnect)
            .field("with_notification", &self.with_notification)
            .finish()
    }
}

impl ChannelSubscription {
    /// Create an idle subscription for `channel`
    pub fn new(channel: impl Into<String>, callback: MessageCallback) -> Self {
        Self {
            channel: channel.into(),
            subscribing: false,
            subscribed: false,
            resubscribe_on_reconnect: false,
            with_notification: false,
            callback,
        }
    }

    /// Channel name
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether a subscribe request awaits confirmation
    pub fn is_subscribing(&self) -> bool {
        self.subscribing
    }

    /// Set the subscribing flag; setting it clears `subscribed`
    pub fn set_subscribing(&mut self, value: bool) {
        if value {
            self.subscribed = false;
        }
        self.subscribing = value;
    }

    /// Whether the server confirmed the subscription
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Set the subscribed flag; setting it clears `subscribing`
    pub fn set_subscribed(&mut self, value: bool) {
        if value {
            self.subscribing = false;
        }
        self.subscribed = value;
    }

    /// Whether the channel is subscribed again after a reconnect
    pub fn resubscribe_on_reconnect(&self) -> bool {
        self.resubscribe_on_reconnect
    }

    /// Keep or drop the channel across reconnects
    pub fn set_resubscribe_on_reconnect(&mut self, value: bool) {
        self.resubscribe_on_reconnect = value;
    }

    /// Whether the subscription carries the push registration
    pub fn with_notification(&self) -> bool {
        self.with_notification
    }

    /// Attach or detach the push registration
    pub fn set_with_notification(&mut self, value: bool) {
        self.with_notification = value;
    }

    /// Callback receiving the channel's messages
    pub fn callback(&self) -> &MessageCallback {
        &self.callback
    }

    /// Replace the message callback
    pub fn set_callback(&mut self, callback: MessageCallback) {
        self.callback = callback;
    }
}

/// Registry of tracked channels and the permissions granted at handshake
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, ChannelSubscription>,
    permissions: Vec<(String, String)>,
}

impl ChannelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the subscription for `channel`, creating it with `callback` if absent
    pub fn add_or_get(
        &mut self,
        channel: &str,
        callback: MessageCallback,
    ) -> &mut ChannelSubscription {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| ChannelSubscription::new(channel, callback))
    }

    /// Look up a tracked channel
    pub fn get(&self, channel: &str) -> Option<&ChannelSubscription> {
        self.channels.get(channel)
    }

    /// Look up a tracked channel for modification
    pub fn get_mut(&mut self, channel: &str) -> Option<&mut ChannelSubscription> {
        self.channels.get_mut(channel)
    }

    /// Whether `channel` is tracked
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Stop tracking `channel`
    pub fn remove(&mut self, channel: &str) -> Option<ChannelSubscription> {
        self.channels.remove(channel)
    }

    /// Forget every channel
    pub fn clear(&mut self) {
        self.channels.clear();
    }

    /// Number of tracked channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is tracked
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Drop every channel not flagged for resubscription and mark the rest
    /// as subscribing again. Returns the channels to resubscribe.
    pub fn retain_for_resubscribe(&mut self) -> Vec<String> {
        self.channels.retain(|_, sub| {
            sub.resubscribe_on_reconnect() && (sub.is_subscribing() || sub.is_subscribed())
        });

        let mut channels = Vec::with_capacity(self.channels.len());
        for (channel, sub) in self.channels.iter_mut() {
            sub.set_subscribing(true);
            channels.push(channel.clone());
        }
        channels.sort();
        channels
    }

    /// Replace the granted (channel pattern, hash) pairs
    pub fn set_permissions(&mut self, permissions: Vec<(String, String)>) {
        self.permissions = permissions;
    }

    /// Drop the granted permissions
    pub fn clear_permissions(&mut self) {
        self.permissions.clear();
    }

    /// A non-empty permission list makes a hash mandatory for every channel.
    pub fn requires_permission(&self) -> bool {
        !self.permissions.is_empty()
    }

    /// Find the hash for `channel`, falling back to its `<domain>:*` pattern
    pub fn hash_for(&self, channel: &str) -> Option<&str> {
        let wildcard = match channel.find(':') {
            Some(index) if index > 0 => Some(format!("{}*", &channel[..=index])),
            _ => None,
        };

        self.permissions
            .iter()
            .find(|(pattern, _)| {
                pattern == channel || wildcard.as_deref() == Some(pattern.as_str())
            })
            .map(|(_, hash)| hash.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn noop() -> MessageCallback {
        Arc::new(|_| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn test_subscribing_and_subscribed_are_exclusive() {
        let mut sub = ChannelSubscription::new("chat", noop());

        sub.set_subscribing(true);
        assert!(sub.is_subscribing() && !sub.is_subscribed());

        sub.set_subscribed(true);
        assert!(sub.is_subscribed() && !sub.is_subscribing());

        sub.set_subscribing(true);
        assert!(sub.is_subscribing() && !sub.is_subscribed());

        sub.set_subscribing(false);
        assert!(!sub.is_subscribing() && !sub.is_subscribed());
    }

    #[test]
    fn test_flag_sequences_never_set_both() {
        let mut sub = ChannelSubscription::new("chat", noop());
        let ops: [(bool, bool); 8] = [
            (true, true),
            (false, true),
            (true, false),
            (false, false),
            (false, true),
            (true, true),
            (true, false),
            (false, true),
        ];

        for (subscribing, value) in ops {
            if subscribing {
                sub.set_subscribing(value);
            } else {
                sub.set_subscribed(value);
            }
            assert!(!(sub.is_subscribing() && sub.is_subscribed()));
        }
    }

    #[test]
    fn test_add_or_get_keeps_existing_entry() {
        let mut registry = ChannelRegistry::new();

        registry.add_or_get("chat", noop()).set_subscribed(true);
        let sub = registry.add_or_get("chat", noop());

        assert!(sub.is_subscribed());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_hash_lookup_exact_then_wildcard() {
        let mut registry = ChannelRegistry::new();
        assert!(!registry.requires_permission());
        assert_eq!(registry.hash_for("news:sports"), None);

        registry.set_permissions(vec![
            ("news:*".to_string(), "H1".to_string()),
            ("news:sports".to_string(), "H2".to_string()),
            ("chat".to_string(), "H3".to_string()),
        ]);

        assert!(registry.requires_permission());
        assert_eq!(registry.hash_for("news:weather"), Some("H1"));
        assert_eq!(registry.hash_for("chat"), Some("H3"));
        assert_eq!(registry.hash_for("other"), None);
        assert_eq!(registry.hash_for("other:x"), None);
        assert_eq!(registry.hash_for(":x"), None);

        registry.clear_permissions();
        assert!(!registry.requires_permission());
    }

    #[test]
    fn test_retain_for_resubscribe() {
        let mut registry = ChannelRegistry::new();

        let keep = registry.add_or_get("keep", noop());
        keep.set_resubscribe_on_reconnect(true);
        keep.set_subscribed(true);

        let dropped = registry.add_or_get("drop", noop());
        dropped.set_subscribed(true);

        let idle = registry.add_or_get("idle", noop());
        idle.set_resubscribe_on_reconnect(true);

        let channels = registry.retain_for_resubscribe();

        assert_eq!(channels, vec!["keep".to_string()]);
        assert!(!registry.contains("drop"));
        assert!(!registry.contains("idle"));
        assert!(registry.get("keep").unwrap().is_subscribing());
    }
}
