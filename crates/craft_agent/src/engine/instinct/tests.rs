use super::*;
use crate::engine::snapshot::{CombatStatus, Environment, ThreatDetail};
use crate::engine::test_support::MockGateway;
use std::time::Duration;

fn layer() -> InstinctLayer {
    InstinctLayer::new(EngineConfig::default())
}

fn world_with(pairs: &[(&str, u32)]) -> WorldSnapshot {
    WorldSnapshot {
        inventory: Inventory::from_pairs(pairs.iter().copied()),
        ..WorldSnapshot::default()
    }
}

fn threat(kind: &str, distance: f32, recommendation: Recommendation) -> ThreatSnapshot {
    ThreatSnapshot {
        recommendation,
        reason: String::new(),
        threats: vec![ThreatDetail {
            kind: kind.to_string(),
            distance,
            danger: 1.0,
        }],
        is_night: false,
    }
}

#[test]
fn calm_world_fires_nothing() {
    let mut layer = layer();
    let action = layer.evaluate(&WorldSnapshot::default(), &ThreatSnapshot::safe(), Instant::now());
    assert_eq!(action, None);
}

#[test]
fn drowning_outranks_everything() {
    let mut layer = layer();
    let mut world = world_with(&[("bread", 2)]);
    world.oxygen = 4.0;
    world.health = 2.0;
    let action = layer
        .evaluate(&world, &ThreatSnapshot::safe(), Instant::now())
        .unwrap();
    assert_eq!(action.rule, InstinctRule::Drowning);
    assert_eq!(action.primary, Operation::EscapeWater {});
}

#[test]
fn critical_health_without_food_digs_shelter() {
    let mut layer = layer();
    let mut world = WorldSnapshot::default();
    world.health = 4.0;
    let now = Instant::now();

    let action = layer.evaluate(&world, &ThreatSnapshot::safe(), now).unwrap();
    assert_eq!(action.rule, InstinctRule::CriticalHealth);
    assert_eq!(action.primary, Operation::DigShelter {});
    assert!(!layer.shelter_ready(now));
    assert!(layer.shelter_ready(now + Duration::from_secs(61)));
}

#[test]
fn critical_health_prefers_food_then_flight() {
    let mut layer = layer();
    let mut world = world_with(&[("cooked_beef", 1)]);
    world.health = 3.0;
    let action = layer
        .evaluate(&world, &ThreatSnapshot::safe(), Instant::now())
        .unwrap();
    assert_eq!(action.primary, Operation::EatFood {});

    let mut layer = self::layer();
    let mut world = WorldSnapshot::default();
    world.health = 3.0;
    world.combat = CombatStatus {
        under_attack: true,
        last_attacker: Some("zombie".to_string()),
        seconds_since_hit: Some(1.0),
    };
    let action = layer
        .evaluate(&world, &ThreatSnapshot::safe(), Instant::now())
        .unwrap();
    assert_eq!(action.primary, Operation::Flee {});
    assert_eq!(action.fallback, Some(Operation::DigShelter {}));
}

#[test]
fn sudden_damage_fights_when_armed_and_favored() {
    let mut layer = layer();
    let now = Instant::now();
    let world = world_with(&[("iron_sword", 1), ("shield", 1), ("iron_chestplate", 1)]);
    layer.evaluate(&world, &ThreatSnapshot::safe(), now);

    let mut hurt = world.clone();
    hurt.health = 12.0;
    let action = layer
        .evaluate(&hurt, &threat("zombie", 6.0, Recommendation::Fight), now)
        .unwrap();
    assert_eq!(action.rule, InstinctRule::SuddenDamage);
    assert_eq!(action.primary, Operation::attack("zombie"));
    assert_eq!(action.prelude[0], Operation::ShieldBlock {});
    assert!(action.prelude.contains(&Operation::equip("iron_sword", "hand")));
    assert!(action.prelude.contains(&Operation::equip("iron_chestplate", "torso")));
}

#[test]
fn sudden_damage_unarmed_flees() {
    let mut layer = layer();
    let now = Instant::now();
    layer.evaluate(&WorldSnapshot::default(), &ThreatSnapshot::safe(), now);

    let mut hurt = WorldSnapshot::default();
    hurt.health = 13.0;
    let action = layer
        .evaluate(&hurt, &threat("skeleton", 10.0, Recommendation::Fight), now)
        .unwrap();
    assert_eq!(action.rule, InstinctRule::SuddenDamage);
    assert_eq!(action.primary, Operation::Flee {});
    assert!(action.prelude.is_empty());
}

#[test]
fn recent_hit_fights_back_against_attacker() {
    let mut layer = layer();
    let mut world = world_with(&[("stone_sword", 1)]);
    world.combat = CombatStatus {
        under_attack: true,
        last_attacker: Some("spider".to_string()),
        seconds_since_hit: Some(1.0),
    };
    let action = layer
        .evaluate(&world, &ThreatSnapshot::safe(), Instant::now())
        .unwrap();
    assert_eq!(action.rule, InstinctRule::UnderAttack);
    assert_eq!(action.primary, Operation::attack("spider"));

    world.inventory = Inventory::new();
    let action = layer
        .evaluate(&world, &ThreatSnapshot::safe(), Instant::now())
        .unwrap();
    assert_eq!(action.primary, Operation::Flee {});
}

#[test]
fn point_blank_creeper_flees_even_when_armed() {
    let mut layer = layer();
    let world = world_with(&[("diamond_sword", 1)]);
    let action = layer
        .evaluate(&world, &threat("creeper", 3.0, Recommendation::Fight), Instant::now())
        .unwrap();
    assert_eq!(action.rule, InstinctRule::PointBlankThreat);
    assert_eq!(action.primary, Operation::Flee {});
}

#[test]
fn flee_recommendation_is_ignored_when_sheltered() {
    let mut layer = layer();
    let threat = threat("witch", 12.0, Recommendation::Flee);

    let action = layer
        .evaluate(&WorldSnapshot::default(), &threat, Instant::now())
        .unwrap();
    assert_eq!(action.rule, InstinctRule::FleeRecommended);
    assert_eq!(action.fallback, Some(Operation::DigShelter {}));

    let mut sheltered = WorldSnapshot::default();
    sheltered.environment = Environment::Underground;
    assert_eq!(layer.evaluate(&sheltered, &threat, Instant::now()), None);
}

#[test]
fn proactive_melee_needs_range_and_weapon() {
    let mut layer = layer();
    let world = world_with(&[("wooden_sword", 1)]);
    let action = layer
        .evaluate(&world, &threat("zombie", 2.5, Recommendation::FightCareful), Instant::now())
        .unwrap();
    assert_eq!(action.rule, InstinctRule::ProactiveFight);
    assert_eq!(action.primary, Operation::attack("zombie"));

    assert_eq!(
        layer.evaluate(&world, &threat("zombie", 8.0, Recommendation::Fight), Instant::now()),
        None
    );
}

#[test]
fn night_shelter_respects_cooldown() {
    let mut layer = layer();
    let mut world = WorldSnapshot::default();
    world.time_phase = TimePhase::Night;
    let now = Instant::now();

    let action = layer.evaluate(&world, &ThreatSnapshot::safe(), now).unwrap();
    assert_eq!(action.rule, InstinctRule::NightExposure);
    assert_eq!(action.reason, "night on the surface");

    assert_eq!(
        layer.evaluate(&world, &ThreatSnapshot::safe(), now + Duration::from_secs(10)),
        None
    );
    assert!(layer
        .evaluate(&world, &ThreatSnapshot::safe(), now + Duration::from_secs(61))
        .is_some());
}

#[test]
fn hunger_eats_only_with_food() {
    let mut layer = layer();
    let mut world = WorldSnapshot::default();
    world.food = 3.0;
    assert_eq!(layer.evaluate(&world, &ThreatSnapshot::safe(), Instant::now()), None);

    world.inventory.add("apple", 2);
    let action = layer
        .evaluate(&world, &ThreatSnapshot::safe(), Instant::now())
        .unwrap();
    assert_eq!(action.rule, InstinctRule::Hunger);
}

#[test]
fn mob_inside_shelter_is_attacked() {
    let mut layer = layer();
    let mut world = world_with(&[("iron_sword", 1)]);
    world.environment = Environment::Indoors;
    let action = layer
        .evaluate(&world, &threat("zombie", 4.0, Recommendation::Avoid), Instant::now())
        .unwrap();
    assert_eq!(action.rule, InstinctRule::HostileInShelter);
}

#[test]
fn deposit_and_collect_have_cooldowns() {
    let mut layer = layer();
    let now = Instant::now();
    let mut world = WorldSnapshot::default();
    world.empty_slots = 1;
    world.nearby_blocks = vec!["chest".to_string()];
    world.nearby_drops = 3;

    let action = layer.evaluate(&world, &ThreatSnapshot::safe(), now).unwrap();
    assert_eq!(action.rule, InstinctRule::InventoryFull);

    let action = layer.evaluate(&world, &ThreatSnapshot::safe(), now).unwrap();
    assert_eq!(action.rule, InstinctRule::CollectDrops);

    assert_eq!(layer.evaluate(&world, &ThreatSnapshot::safe(), now), None);
}

#[test]
fn fire_runs_prelude_then_fallback() {
    let gateway = MockGateway::new();
    gateway.reply("flee", false, "path blocked");
    let mut layer = layer();
    let now = Instant::now();
    let action = InstinctAction::new(InstinctRule::FleeRecommended, Operation::Flee {}, "witch")
        .with_prelude(vec![Operation::ShieldBlock {}])
        .with_fallback(Operation::DigShelter {});

    let outcome = layer.fire(&action, &gateway, now);
    assert!(outcome.success);
    assert_eq!(outcome.rule, InstinctRule::FleeRecommended);
    assert_eq!(gateway.tools_called(), vec!["shield_block", "flee", "dig_shelter"]);
    assert!(outcome.action.ends_with("-> dig_shelter()"));
    assert!(!layer.shelter_ready(now));
}

#[test]
fn fire_skips_fallback_on_success() {
    let gateway = MockGateway::new();
    let mut layer = layer();
    let action = InstinctAction::new(InstinctRule::Hunger, Operation::EatFood {}, "hungry")
        .with_fallback(Operation::DigShelter {});
    let outcome = layer.fire(&action, &gateway, Instant::now());
    assert!(outcome.success);
    assert_eq!(gateway.tools_called(), vec!["eat_food"]);
}
