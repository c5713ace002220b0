// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Keeps the server from sending invitations on the client's behalf.

use crate::ical::{self, Component};
use crate::types::SchedulingCapability;

/// Whether the account lets the server deliver scheduling messages.
pub(crate) fn save_schedules_enabled(capability: SchedulingCapability, auto_schedule: bool) -> bool {
    auto_schedule && (capability.scheduling || capability.auto_scheduling)
}

/// Marks organizers and attendees as client-scheduled when the server would
/// otherwise send messages the user did not ask for.
///
/// Only newly created objects are tagged. Returns true if the object changed,
/// in which case the caller strips the marker again from its retained copy.
pub(crate) fn maybe_suppress(
    comp: &mut Component,
    capability: SchedulingCapability,
    auto_schedule: bool,
    silent: bool,
    creating: bool,
) -> bool {
    if !creating || !capability.auto_scheduling {
        return false;
    }
    if silent || !save_schedules_enabled(capability, auto_schedule) {
        ical::set_schedule_agent_client(comp)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEETING: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:meeting-1\r\n\
ORGANIZER:mailto:alice@example.org\r\n\
ATTENDEE;CN=Bob:mailto:bob@example.org\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    const AUTO: SchedulingCapability = SchedulingCapability {
        scheduling: true,
        auto_scheduling: true,
    };

    #[test]
    fn silence_tags_every_participant() {
        let mut comp = Component::parse(MEETING).unwrap();
        assert!(maybe_suppress(&mut comp, AUTO, true, true, true));
        let text = comp.to_string();
        assert!(text.contains("ORGANIZER;SCHEDULE-AGENT=CLIENT:mailto:alice@example.org"));
        assert!(text.contains("ATTENDEE;CN=Bob;SCHEDULE-AGENT=CLIENT:mailto:bob@example.org"));
    }

    #[test]
    fn disabled_auto_schedule_suppresses() {
        let mut comp = Component::parse(MEETING).unwrap();
        assert!(maybe_suppress(&mut comp, AUTO, false, false, true));
    }

    #[test]
    fn untouched_without_server_scheduling() {
        let mut comp = Component::parse(MEETING).unwrap();
        let caps = SchedulingCapability::default();
        assert!(!maybe_suppress(&mut comp, caps, false, true, true));
        assert_eq!(comp.to_string(), Component::parse(MEETING).unwrap().to_string());
    }

    #[test]
    fn updates_and_wanted_messages_are_untouched() {
        let mut comp = Component::parse(MEETING).unwrap();
        assert!(!maybe_suppress(&mut comp, AUTO, true, true, false));
        assert!(!maybe_suppress(&mut comp, AUTO, true, false, true));
        assert!(!comp.to_string().contains("SCHEDULE-AGENT"));
    }

    #[test]
    fn schedules_enabled_needs_account_opt_in() {
        assert!(save_schedules_enabled(AUTO, true));
        assert!(!save_schedules_enabled(AUTO, false));
        assert!(!save_schedules_enabled(SchedulingCapability::default(), true));
    }
}
