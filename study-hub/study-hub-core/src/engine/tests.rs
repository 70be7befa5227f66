use super::*;
use crate::chapter::ChapterData;
use crate::study::{SettingKey, SettingValue, UserSelection};

fn first_chapter() -> ChapterData {
    ChapterData {
        name: "Chapter 1".into(),
        variant: None,
        from_fen: None,
        orientation: Orientation::White,
        mode: ChapterMode::Normal,
        set_active: true,
    }
}

/// Study with owner `o`, contributor `c`, viewer `v`, all connected.
fn study_with_crew() -> (StudySync, Uuid, Uuid, Uuid) {
    let mut sync = StudySync::new(
        "Najdorf deep dive",
        Member::new("o", "Olga", MemberRole::Owner),
        Visibility::Public,
        first_chapter(),
    );
    sync.study.add_member(Member::new("c", "Cem", MemberRole::Contributor));
    sync.study.add_member(Member::new("v", "Vi", MemberRole::Viewer));
    let (so, sc, sv) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    sync.connect(so, "o").unwrap();
    sync.connect(sc, "c").unwrap();
    sync.connect(sv, "v").unwrap();
    (sync, so, sc, sv)
}

fn move_action(path: &str, orig: &str, dest: &str) -> Action {
    Action::Move {
        path: path.into(),
        orig: orig.into(),
        dest: dest.into(),
        promotion: None,
    }
}

fn events_for(out: &[Outbound], socket: Uuid) -> Vec<&ServerEvent> {
    out.iter()
        .filter(|o| o.socket_id == socket)
        .map(|o| &o.event)
        .collect()
}

#[test]
fn sticky_broadcast_updates_every_other_sticky_cursor() {
    let (mut sync, so, sc, sv) = study_with_crew();
    let out = sync.apply("o", move_action("", "e2", "e4"));

    let new_pos = sync.study().position.clone();
    assert_eq!(new_pos.path.depth(), 1);
    assert_eq!(sync.presence().get("c").unwrap().position, new_pos);
    assert_eq!(sync.presence().get("v").unwrap().position, new_pos);

    // followers hear both the tree mutation and the cursor snap, attributed
    for socket in [sc, sv] {
        let events = events_for(&out, socket);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::NodeAdded { who, .. } if who.user_id == "o")));
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::PositionUpdated { who, .. } if who.user_id == "o")));
    }
    // the mover gets the echo, not a snap
    let mover_events = events_for(&out, so);
    assert_eq!(mover_events.len(), 1);
    assert!(matches!(mover_events[0], ServerEvent::NodeAdded { .. }));
}

#[test]
fn non_sticky_cursor_stays_put_but_hears_the_mutation() {
    let (mut sync, so, _sc, sv) = study_with_crew();
    assert!(sync.apply("v", Action::SetSticky { sticky: false }).is_empty());

    let out = sync.apply("c", move_action("", "d2", "d4"));
    let new_pos = sync.study().position.clone();

    assert_eq!(sync.presence().get("v").unwrap().position.path.depth(), 0);
    assert_eq!(sync.presence().get("o").unwrap().position, new_pos);

    let v_events = events_for(&out, sv);
    assert_eq!(v_events.len(), 1);
    assert!(matches!(v_events[0], ServerEvent::NodeAdded { .. }));
    assert!(events_for(&out, so)
        .iter()
        .any(|e| matches!(e, ServerEvent::PositionUpdated { who, .. } if who.user_id == "c")));
}

#[test]
fn non_sticky_mover_does_not_drag_the_shared_position() {
    let (mut sync, _so, _sc, sv) = study_with_crew();
    sync.apply("c", Action::SetSticky { sticky: false });
    let out = sync.apply("c", move_action("", "g1", "f3"));

    // tree mutated and broadcast, but the official position is untouched
    assert_eq!(sync.study().position.path.depth(), 0);
    assert_eq!(sync.presence().get("v").unwrap().position.path.depth(), 0);
    assert!(events_for(&out, sv)
        .iter()
        .all(|e| matches!(e, ServerEvent::NodeAdded { .. })));
}

#[test]
fn viewer_cannot_mutate_the_shared_tree() {
    let (mut sync, _so, _sc, sv) = study_with_crew();
    let out = sync.apply("v", move_action("", "e2", "e4"));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].socket_id, sv);
    assert!(matches!(out[0].event, ServerEvent::Denied { .. }));
    assert_eq!(sync.study().position.path.depth(), 0);
}

#[test]
fn denied_actions_reach_the_requester_only() {
    let (mut sync, so, sc, sv) = study_with_crew();
    let out = sync.apply(
        "v",
        Action::SetSetting {
            key: SettingKey::Chat,
            value: SettingValue::Selection(UserSelection::Nobody),
        },
    );
    assert!(events_for(&out, so).is_empty());
    assert!(events_for(&out, sc).is_empty());
    assert_eq!(events_for(&out, sv).len(), 1);
}

#[test]
fn setting_change_gates_the_very_next_action() {
    let (mut sync, _so, sc, _sv) = study_with_crew();
    let chapter_id = sync.chapters().active_id().unwrap();

    // contributor may request analysis while computer is open to everyone
    let out = sync.apply("c", Action::RequestAnalysis { chapter_id });
    assert!(matches!(out[0].event, ServerEvent::AnalysisQueued { .. }));

    sync.apply(
        "o",
        Action::SetSetting {
            key: SettingKey::Computer,
            value: SettingValue::Selection(UserSelection::Owner),
        },
    );
    let out = sync.apply("c", Action::RequestAnalysis { chapter_id });
    let events = events_for(&out, sc);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ServerEvent::Denied { .. }));
}

#[test]
fn practice_moves_diverge_privately() {
    let (mut sync, _so, sc, sv) = study_with_crew();
    let chapter_id = sync.chapters().active_id().unwrap();
    sync.apply(
        "o",
        Action::EditChapter {
            id: chapter_id,
            name: "Practice the endgame".into(),
            orientation: Orientation::White,
            mode: ChapterMode::Practice,
            description: None,
        },
    );

    let out = sync.apply("c", move_action("", "e2", "e4"));

    // no shared mutation, nothing for anyone else
    assert_eq!(sync.study().position.path.depth(), 0);
    assert!(events_for(&out, sv).is_empty());
    let c_events = events_for(&out, sc);
    assert_eq!(c_events.len(), 1);
    assert!(matches!(c_events[0], ServerEvent::NodeAdded { .. }));
    // the actor's own view reflects the move
    assert_eq!(sync.presence().get("c").unwrap().position.path.depth(), 1);
}

#[test]
fn gamebook_viewers_advance_but_never_branch() {
    let (mut sync, _so, _sc, sv) = study_with_crew();
    let chapter_id = sync.chapters().active_id().unwrap();
    // the owner scripts one mainline move, then flips the mode
    sync.apply("o", move_action("", "e2", "e4"));
    let scripted = sync.study().position.clone();
    sync.apply(
        "o",
        Action::EditChapter {
            id: chapter_id,
            name: "Gamebook".into(),
            orientation: Orientation::White,
            mode: ChapterMode::Gamebook,
            description: None,
        },
    );

    // the same move advances the viewer's read cursor, privately
    let out = sync.apply("v", move_action("", "e2", "e4"));
    assert_eq!(sync.presence().get("v").unwrap().position, scripted);
    let v_events = events_for(&out, sv);
    assert_eq!(v_events.len(), 1);
    assert!(matches!(v_events[0], ServerEvent::PositionUpdated { .. }));
    assert_eq!(out.len(), 1);

    // a move off the script is a mode violation, not a mutation
    let out = sync.apply("v", move_action(scripted.path.as_str(), "a7", "a5"));
    assert!(matches!(out[0].event, ServerEvent::Denied { .. }));
    assert_eq!(sync.presence().get("v").unwrap().position, scripted);
}

#[test]
fn conceal_bounds_viewer_payloads() {
    let (mut sync, _so, _sc, sv) = study_with_crew();
    let chapter_id = sync.chapters().active_id().unwrap();
    sync.apply(
        "o",
        Action::EditChapter {
            id: chapter_id,
            name: "Conceal".into(),
            orientation: Orientation::White,
            mode: ChapterMode::Conceal { depth: 1 },
            description: None,
        },
    );

    let out = sync.apply("o", move_action("", "e2", "e4"));
    // depth 1 is still visible to the viewer
    assert!(events_for(&out, sv).iter().any(
        |e| matches!(e, ServerEvent::NodeAdded { position, .. } if !position.concealed),
    ));

    let shared = sync.study().position.clone();
    let out = sync.apply("o", move_action(shared.path.as_str(), "e7", "e5"));
    // depth 2 is beyond the horizon: the viewer's visible prefix did not
    // move, so they hear nothing at all
    assert!(events_for(&out, sv).is_empty());

    // the snapshot honors the same horizon
    let data = sync.snapshot_for("v").unwrap();
    assert!(data.analysis.paths.iter().all(|p| p.depth() <= 1));
    assert!(data.analysis.position.concealed);
    let full = sync.snapshot_for("c").unwrap();
    assert!(full.analysis.paths.iter().any(|p| p.depth() == 2));
}

#[test]
fn conceal_skips_members_with_no_visible_change() {
    let (mut sync, _so, _sc, sv) = study_with_crew();
    let chapter_id = sync.chapters().active_id().unwrap();
    sync.apply(
        "o",
        Action::EditChapter {
            id: chapter_id,
            name: "Conceal".into(),
            orientation: Orientation::White,
            mode: ChapterMode::Conceal { depth: 0 },
            description: None,
        },
    );
    sync.apply("o", move_action("", "e2", "e4"));
    let shared = sync.study().position.clone();
    let out = sync.apply("o", move_action(shared.path.as_str(), "e7", "e5"));
    // the viewer's visible prefix did not move: no empty broadcast
    assert!(events_for(&out, sv).is_empty());
}

#[test]
fn deleting_the_active_chapter_keeps_cursors_valid() {
    let (mut sync, _so, _sc, _sv) = study_with_crew();
    let first = sync.chapters().active_id().unwrap();
    sync.apply(
        "o",
        Action::AddChapter {
            data: ChapterData {
                name: "Second".into(),
                variant: None,
                from_fen: None,
                orientation: Orientation::Black,
                mode: ChapterMode::Normal,
                set_active: true,
            },
        },
    );
    let second = sync.chapters().active_id().unwrap();
    assert_ne!(first, second);

    let out = sync.apply("o", Action::DeleteChapter { chapter_id: second });
    assert_eq!(sync.chapters().active_id(), Some(first));
    for (_, cursor) in sync.presence().iter() {
        assert_eq!(cursor.position.chapter_id, first);
    }
    assert!(out
        .iter()
        .any(|o| matches!(o.event, ServerEvent::ChapterRemoved { .. })));
    assert!(out
        .iter()
        .any(|o| matches!(o.event, ServerEvent::ChapterSwitched { .. })));
}

#[test]
fn deleting_the_last_chapter_restores_a_default() {
    let (mut sync, _so, _sc, _sv) = study_with_crew();
    let only = sync.chapters().active_id().unwrap();
    let out = sync.apply("o", Action::DeleteChapter { chapter_id: only });

    assert_eq!(sync.chapters().len(), 1);
    let active = sync.chapters().active_id().unwrap();
    assert_ne!(active, only);
    assert_eq!(sync.study().position.chapter_id, active);
    assert!(out
        .iter()
        .any(|o| matches!(o.event, ServerEvent::ChapterAdded { .. })));
}

#[test]
fn stale_chapter_reference_triggers_resync() {
    let (mut sync, _so, sc, _sv) = study_with_crew();
    let out = sync.apply(
        "c",
        Action::SetChapter {
            chapter_id: Uuid::new_v4(),
        },
    );
    let events = events_for(&out, sc);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ServerEvent::Denied { .. }));
    assert!(matches!(
        events[1],
        ServerEvent::ReloadRequired { analysis: true, .. }
    ));
}

#[test]
fn enabling_sticky_snaps_to_the_shared_position() {
    let (mut sync, _so, _sc, sv) = study_with_crew();
    sync.apply("v", Action::SetSticky { sticky: false });
    sync.apply("o", move_action("", "e2", "e4"));
    assert_eq!(sync.presence().get("v").unwrap().position.path.depth(), 0);

    let out = sync.apply("v", Action::SetSticky { sticky: true });
    assert_eq!(
        sync.presence().get("v").unwrap().position,
        sync.study().position
    );
    let events = events_for(&out, sv);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ServerEvent::PositionUpdated { .. }));
    assert_eq!(out.len(), 1);
}

#[test]
fn chat_respects_the_selector_and_spectators_are_outside_member() {
    let (mut sync, _so, _sc, _sv) = study_with_crew();
    // chat defaults to members only; a connected spectator of a public study is out
    let stranger_socket = Uuid::new_v4();
    sync.connect(stranger_socket, "stranger").unwrap();
    let out = sync.apply(
        "stranger",
        Action::ChatSay {
            text: "hello".into(),
        },
    );
    assert!(matches!(out[0].event, ServerEvent::Denied { .. }));

    let out = sync.apply("v", Action::ChatSay { text: "hi all".into() });
    // all four connections hear a member's chat line
    assert_eq!(out.len(), 4);
    assert!(out
        .iter()
        .all(|o| matches!(&o.event, ServerEvent::ChatLine { who, .. } if who.user_id == "v")));
}

#[test]
fn membership_changes_take_effect_immediately() {
    let (mut sync, _so, _sc, sv) = study_with_crew();
    sync.apply(
        "o",
        Action::SetRole {
            user_id: "v".into(),
            role: MemberRole::Contributor,
        },
    );
    assert!(sync.presence().get("v").unwrap().write_allowed);
    let out = sync.apply("v", move_action("", "b1", "c3"));
    assert!(events_for(&out, sv)
        .iter()
        .any(|e| matches!(e, ServerEvent::NodeAdded { .. })));

    sync.apply("o", Action::Kick { user_id: "v".into() });
    assert!(!sync.presence().get("v").unwrap().write_allowed);
    let shared = sync.study().position.clone();
    let out = sync.apply("v", move_action(shared.path.as_str(), "g8", "f6"));
    assert!(matches!(out[0].event, ServerEvent::Denied { .. }));
}

#[test]
fn same_member_actions_apply_in_submission_order() {
    let (mut sync, _so, _sc, _sv) = study_with_crew();
    sync.apply("c", move_action("", "e2", "e4"));
    let after_first = sync.study().position.clone();
    sync.apply("c", move_action(after_first.path.as_str(), "e7", "e5"));
    let after_second = sync.study().position.clone();
    assert_eq!(after_second.path.depth(), 2);
    assert!(after_first.path.contains(&after_second.path));
}

#[test]
fn reorder_and_reorder_validation() {
    let (mut sync, _so, sc, _sv) = study_with_crew();
    sync.apply(
        "c",
        Action::AddChapter {
            data: ChapterData {
                name: "Second".into(),
                variant: None,
                from_fen: None,
                orientation: Orientation::White,
                mode: ChapterMode::Normal,
                set_active: false,
            },
        },
    );
    let mut order = sync.chapters().order();
    order.reverse();
    let out = sync.apply(
        "c",
        Action::ReorderChapters { ids: order.clone() },
    );
    assert_eq!(sync.chapters().order(), order);
    assert!(out
        .iter()
        .any(|o| matches!(o.event, ServerEvent::ChaptersReordered { .. })));

    let out = sync.apply(
        "c",
        Action::ReorderChapters {
            ids: vec![Uuid::new_v4()],
        },
    );
    let events = events_for(&out, sc);
    assert!(matches!(events[0], ServerEvent::Denied { .. }));
}

#[test]
fn study_description_is_gated_by_the_flag() {
    let (mut sync, _so, sc, _sv) = study_with_crew();
    let out = sync.apply(
        "c",
        Action::SetStudyDescription {
            text: "Our shared prep".into(),
        },
    );
    assert!(matches!(events_for(&out, sc)[0], ServerEvent::Denied { .. }));

    sync.apply(
        "o",
        Action::SetSetting {
            key: SettingKey::Description,
            value: SettingValue::Toggle(true),
        },
    );
    let out = sync.apply(
        "c",
        Action::SetStudyDescription {
            text: "Our shared prep".into(),
        },
    );
    assert!(out
        .iter()
        .all(|o| matches!(o.event, ServerEvent::DescriptionChanged { .. })));
    assert_eq!(sync.study().description.as_deref(), Some("Our shared prep"));
}

#[test]
fn malformed_actions_never_reach_the_permission_gate() {
    let (mut sync, _so, _sc, sv) = study_with_crew();
    // structurally broken even though the viewer would be denied anyway;
    // the reason must be the malformed payload, checked first
    let out = sync.apply(
        "v",
        Action::Move {
            path: "abc".into(),
            orig: "e2".into(),
            dest: "e4".into(),
            promotion: None,
        },
    );
    let events = events_for(&out, sv);
    match events[0] {
        ServerEvent::Denied { reason } => assert!(reason.contains("malformed")),
        other => panic!("unexpected event {other:?}"),
    }
}
