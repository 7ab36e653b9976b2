//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`. The fixture
//! pack is a small two-era economy that touches every content table.

use crate::catalog::*;
use crate::config::EngineConfig;
use crate::effect::Effect;
use crate::id::*;
use crate::production;
use crate::state::{BuildingInstance, WorldState};

/// Seed used by [`fixture_state`].
pub const FIXTURE_SEED: u64 = 0x00C1_A7ED;

// ===========================================================================
// Small constructors
// ===========================================================================

pub fn amounts(pairs: &[(&str, f64)]) -> ResourceAmounts {
    pairs.iter().map(|&(id, v)| (ResourceId::from(id), v)).collect()
}

fn resource(id: &str, name: &str, sort_order: i32, starting: f64, cap: f64) -> ResourceDefinition {
    ResourceDefinition {
        id: id.into(),
        name: name.into(),
        sort_order,
        starting_amount: starting,
        base_cap: cap,
        biosphere_sensitive: false,
    }
}

/// A stone-era building with no flows; callers fill in what they need.
pub fn building(id: &str, name: &str) -> BuildingDefinition {
    BuildingDefinition {
        id: id.into(),
        name: name.into(),
        era: "stone".into(),
        category: String::new(),
        max_level: 5,
        base_cost: amounts(&[("materials", 20.0)]),
        cost_growth: 1.5,
        build_time_seconds: 600.0,
        production_per_hour: ResourceAmounts::new(),
        consumption_per_hour: ResourceAmounts::new(),
        maintenance_per_hour: ResourceAmounts::new(),
        storage_cap_add: ResourceAmounts::new(),
        defense_score: 0.0,
        project_speed_bonus: 0.0,
        adjacency_bonus: None,
        logistics_cap_add: 0.0,
        district_tag: None,
        district_bonus: 1.0,
        efficiency_floor: 0.0,
        cohesion_per_hour: 0.0,
        biosphere_per_hour: 0.0,
    }
}

/// A one-crew stone-era research project.
pub fn project(id: &str, duration_seconds: f64, costs: ResourceAmounts) -> ProjectDefinition {
    ProjectDefinition {
        id: id.into(),
        name: id.replace('_', " "),
        era: "stone".into(),
        category: "research".into(),
        duration_seconds,
        crew_required: 1,
        costs,
        effects: Vec::new(),
        description: String::new(),
        tags: Vec::new(),
    }
}

fn policy(id: &str, era: &str, effects: Vec<Effect>) -> PolicyDefinition {
    PolicyDefinition {
        id: id.into(),
        name: id.replace('_', " "),
        slot: "economy".into(),
        era: era.into(),
        effects,
        cooldown_seconds: 3_600.0,
        description: String::new(),
    }
}

fn choice(id: &str, effects: Vec<Effect>) -> EventChoiceDefinition {
    EventChoiceDefinition {
        id: id.into(),
        title: id.into(),
        description: String::new(),
        effects,
        next: None,
    }
}

fn event(id: &str, category: &str, title: &str, weight: f64, kind: RandomEventKind) -> EventDefinition {
    EventDefinition {
        id: id.into(),
        category: category.into(),
        title: title.into(),
        description: String::new(),
        weight,
        kind,
    }
}

// ===========================================================================
// Fixture pack
// ===========================================================================

fn fixture_resources() -> Vec<ResourceDefinition> {
    vec![
        ResourceDefinition {
            biosphere_sensitive: true,
            ..resource("food", "Food", 0, 50.0, 500.0)
        },
        resource("materials", "Materials", 1, 200.0, 2_000.0),
        resource("tools", "Tools", 2, 0.0, 200.0),
        resource("influence", "Influence", 3, 50.0, 100.0),
        resource("energy", "Energy", 4, 0.0, 10_000.0),
    ]
}

fn fixture_buildings() -> Vec<BuildingDefinition> {
    vec![
        BuildingDefinition {
            category: "agriculture".into(),
            production_per_hour: amounts(&[("food", 20.0)]),
            district_tag: Some("fields".into()),
            district_bonus: 1.15,
            ..building("farm", "Farm")
        },
        BuildingDefinition {
            category: "industry".into(),
            consumption_per_hour: amounts(&[("materials", 10.0)]),
            production_per_hour: amounts(&[("tools", 5.0)]),
            build_time_seconds: 900.0,
            ..building("workshop", "Workshop")
        },
        BuildingDefinition {
            category: "storage".into(),
            storage_cap_add: amounts(&[("food", 200.0)]),
            ..building("granary", "Granary")
        },
        BuildingDefinition {
            category: "agriculture".into(),
            production_per_hour: amounts(&[("food", 6.0)]),
            adjacency_bonus: Some(AdjacencyBonus {
                requires_building: "farm".into(),
                multiplier: 1.25,
            }),
            ..building("mill", "Mill")
        },
        BuildingDefinition {
            category: "logistics".into(),
            logistics_cap_add: 50.0,
            ..building("depot", "Depot")
        },
        BuildingDefinition {
            category: "defense".into(),
            defense_score: 20.0,
            max_level: 3,
            ..building("palisade", "Palisade")
        },
        BuildingDefinition {
            category: "industry".into(),
            production_per_hour: amounts(&[("energy", 15.0)]),
            biosphere_per_hour: -0.02,
            ..building("smelter", "Smelter")
        },
        BuildingDefinition {
            era: "bronze".into(),
            category: "industry".into(),
            consumption_per_hour: amounts(&[("materials", 4.0)]),
            production_per_hour: amounts(&[("tools", 4.0)]),
            base_cost: amounts(&[("materials", 60.0), ("tools", 10.0)]),
            ..building("forge", "Forge")
        },
    ]
}

fn fixture_projects() -> Vec<ProjectDefinition> {
    vec![
        ProjectDefinition {
            effects: vec![Effect::AddResourceMultiplier {
                resource: "food".into(),
                multiplier: 1.1,
            }],
            tags: vec!["agriculture".into()],
            ..project("irrigation", 1_800.0, amounts(&[("materials", 30.0)]))
        },
        ProjectDefinition {
            effects: vec![Effect::UnlockEra { era: "bronze".into() }],
            tags: vec!["craft".into()],
            ..project("pottery", 3_600.0, amounts(&[("materials", 40.0)]))
        },
        ProjectDefinition {
            era: "bronze".into(),
            effects: vec![Effect::SetFlag {
                flag: "bronze_complete".into(),
            }],
            tags: vec!["craft".into()],
            ..project(
                "bronze_working",
                7_200.0,
                amounts(&[("materials", 50.0), ("tools", 10.0)]),
            )
        },
        ProjectDefinition {
            category: "megaproject".into(),
            effects: vec![Effect::SetFlag {
                flag: "type_ii_complete".into(),
            }],
            tags: vec!["energy".into()],
            ..project("sky_array", 14_400.0, amounts(&[("materials", 100.0)]))
        },
        ProjectDefinition {
            category: "megaproject".into(),
            effects: vec![Effect::SetFlag {
                flag: "type_ii_complete".into(),
            }],
            tags: vec!["energy".into()],
            ..project("deep_core", 14_400.0, amounts(&[("materials", 100.0)]))
        },
    ]
}

fn fixture_eras() -> Vec<EraDefinition> {
    vec![
        EraDefinition {
            id: "stone".into(),
            name: "Stone Age".into(),
            sort_order: 0,
            keystone_project_ids: vec!["pottery".into()],
            unlocks_building_ids: ["farm", "workshop", "granary", "mill", "depot", "palisade", "smelter"]
                .into_iter()
                .map(BuildingId::from)
                .collect(),
            unlocks_project_ids: ["irrigation", "pottery", "sky_array", "deep_core"]
                .into_iter()
                .map(ProjectId::from)
                .collect(),
            completion_flags: Vec::new(),
            description: String::new(),
        },
        EraDefinition {
            id: "bronze".into(),
            name: "Bronze Age".into(),
            sort_order: 1,
            keystone_project_ids: vec!["bronze_working".into()],
            unlocks_building_ids: vec!["forge".into()],
            unlocks_project_ids: vec!["bronze_working".into()],
            completion_flags: vec!["bronze_complete".into()],
            description: String::new(),
        },
    ]
}

fn fixture_chains() -> Vec<EventChainDefinition> {
    vec![
        EventChainDefinition {
            id: "surplus".into(),
            title: "Surplus Stores".into(),
            description: "The granaries overflow.".into(),
            trigger: EventTrigger {
                resource_at_cap: Some("food".into()),
                ..EventTrigger::default()
            },
            choices: vec![
                choice(
                    "trade",
                    vec![Effect::AdjustFaction {
                        faction: "guild".into(),
                        delta: 1,
                    }],
                ),
                choice(
                    "store",
                    vec![Effect::AddResourceCap {
                        resource: "food".into(),
                        amount: 50.0,
                    }],
                ),
            ],
            effects: Vec::new(),
            cooldown_seconds: 7_200.0,
            unique_flag: None,
        },
        EventChainDefinition {
            id: "blight".into(),
            title: "Blight".into(),
            description: "The fields sicken.".into(),
            trigger: EventTrigger {
                max_biosphere: Some(0.2),
                ..EventTrigger::default()
            },
            choices: vec![choice("burn", vec![Effect::AddBiosphere { amount: 0.1 }])],
            effects: Vec::new(),
            cooldown_seconds: 0.0,
            unique_flag: Some("blight_seen".into()),
        },
    ]
}

pub fn fixture_pack() -> ContentPack {
    ContentPack {
        resources: fixture_resources(),
        buildings: fixture_buildings(),
        projects: fixture_projects(),
        eras: fixture_eras(),
        factions: vec![
            FactionDefinition {
                id: "raiders".into(),
                name: "Raiders".into(),
                description: String::new(),
                starting_relationship: -1,
                hostile: true,
            },
            FactionDefinition {
                id: "guild".into(),
                name: "Merchant Guild".into(),
                description: String::new(),
                starting_relationship: 0,
                hostile: false,
            },
        ],
        contracts: vec![ContractDefinition {
            id: "guild_trade".into(),
            name: "Guild Trade".into(),
            faction: "guild".into(),
            required_relationship: 0,
            duration_seconds: 7_200.0,
            upkeep_per_hour: amounts(&[("food", 5.0)]),
            effects_per_hour: amounts(&[("materials", 10.0)]),
            multipliers: ResourceAmounts::new(),
            security_bonus: 5.0,
            price_index_multiplier: 1.0,
            renewable: true,
            requires_unlock: false,
            penalty_effects: Vec::new(),
            description: String::new(),
        }],
        events: vec![
            event("quiet_season", "narrative", "A Quiet Season", 2.0, RandomEventKind::Narrative),
            event(
                "glut",
                "market",
                "Food Glut",
                1.0,
                RandomEventKind::MarketShock {
                    resource: "food".into(),
                },
            ),
        ],
        policies: vec![
            policy(
                "rationing",
                "stone",
                vec![Effect::AddResourceMultiplier {
                    resource: "food".into(),
                    multiplier: 0.9,
                }],
            ),
            policy(
                "free_trade",
                "stone",
                vec![Effect::AddResourceMultiplier {
                    resource: "materials".into(),
                    multiplier: 1.1,
                }],
            ),
            policy("guild_charter", "bronze", vec![Effect::AddSecurityBonus { amount: 5.0 }]),
        ],
        event_chains: fixture_chains(),
        metahumans: vec![MetahumanDefinition {
            id: "warden".into(),
            name: "The Warden".into(),
            description: String::new(),
            ally_passive_effects: vec![Effect::AddSecurityBonus { amount: 10.0 }],
            enemy_passive_effects: vec![Effect::AddResourceMultiplier {
                resource: "food".into(),
                multiplier: 0.9,
            }],
        }],
        people: vec![
            PersonDefinition {
                id: "scout".into(),
                name: "Scout".into(),
                era: "stone".into(),
                role: "explorer".into(),
                costs: amounts(&[("food", 30.0)]),
                effects: vec![Effect::ProjectSpeedBonus { amount: 0.1 }],
                description: String::new(),
            },
            PersonDefinition {
                id: "archivist".into(),
                name: "Archivist".into(),
                era: "bronze".into(),
                role: "scholar".into(),
                costs: amounts(&[("influence", 20.0)]),
                effects: vec![Effect::ProjectSpeedBonus { amount: 0.2 }],
                description: String::new(),
            },
        ],
        legacy_upgrades: vec![LegacyUpgradeDefinition {
            id: "head_start".into(),
            name: "Head Start".into(),
            cost: 2,
            effects: vec![Effect::AddCrew { count: 1 }],
            description: String::new(),
        }],
        domains: vec![DomainDefinition {
            id: "agrarian".into(),
            name: "Agrarian".into(),
            description: String::new(),
            tags: vec!["agriculture".into()],
            tiers: vec![
                DomainTierDefinition {
                    tier: 1,
                    required_points: 3,
                    effects: vec![Effect::AddCrew { count: 1 }],
                },
                DomainTierDefinition {
                    tier: 2,
                    required_points: 6,
                    effects: vec![Effect::AddResourceCap {
                        resource: "food".into(),
                        amount: 50.0,
                    }],
                },
            ],
        }],
        dispatches: vec![
            DispatchDefinition {
                id: "forage".into(),
                name: "Forage".into(),
                description: String::new(),
                duration_seconds: 1_800.0,
                required_crew: 1,
                rewards: amounts(&[("food", 40.0)]),
                risk_chance: 0.2,
                era: "stone".into(),
                tags: vec!["agriculture".into()],
                requires_flag: None,
                requires_flag_not_set: None,
            },
            DispatchDefinition {
                id: "deep_survey".into(),
                name: "Deep Survey".into(),
                description: String::new(),
                duration_seconds: 7_200.0,
                required_crew: 2,
                rewards: amounts(&[("materials", 150.0)]),
                risk_chance: 0.3,
                era: "stone".into(),
                tags: Vec::new(),
                requires_flag: Some("survey_charts".into()),
                requires_flag_not_set: None,
            },
        ],
        megaproject_families: vec![MegaprojectFamilyDefinition {
            id: "type_ii".into(),
            choices: vec!["sky_array".into(), "deep_core".into()],
            exclusive: true,
            description: "the Type II path".into(),
        }],
        achievements: vec![AchievementDefinition {
            id: "first_harvest".into(),
            name: "First Harvest".into(),
            description: String::new(),
            condition: AchievementCondition::ResourceTotal {
                resource: "food".into(),
                amount: 500.0,
            },
            effects: vec![Effect::GrantChronoShards { amount: 1 }],
        }],
        rules: RulesDefinition {
            collector_capacity_hours: 8.0,
            starting_crew: 2,
            grid_size: 20,
            grid_growth_per_era: 10,
            max_roster: 8,
            offline_cap_days: 7,
            cohesion_resource: Some("influence".into()),
            prestige: PrestigeDefinition {
                energy_resource: Some("energy".into()),
                energy_flag: Some("grid_online".into()),
                energy_log_offset: 7,
            },
        },
    }
}

pub fn fixture_catalog() -> Catalog {
    match Catalog::from_pack(fixture_pack()) {
        Ok(catalog) => catalog,
        Err(e) => panic!("fixture pack is invalid: {e}"),
    }
}

// ===========================================================================
// State helpers
// ===========================================================================

pub fn fixture_state(catalog: &Catalog) -> WorldState {
    let mut state = WorldState::new(catalog, &EngineConfig::default(), FIXTURE_SEED, 0.0);
    production::refresh_caps(&mut state, catalog);
    state
}

/// Set a stock, raising its cached cap if `amount` exceeds it.
pub fn set_amount(state: &mut WorldState, resource: &str, amount: f64) {
    let entry = state.resources.entry(ResourceId::from(resource)).or_default();
    entry.amount = amount;
    if entry.cap < amount {
        entry.cap = amount;
    }
}

/// Fill every stock to its cached cap.
pub fn fill_all(state: &mut WorldState) {
    for resource in state.resources.values_mut() {
        resource.amount = resource.cap;
    }
}

/// Drop a finished level-1 building at `(x, y)` without any checks.
pub fn place(state: &mut WorldState, building: &str, x: i32, y: i32) -> BuildingKey {
    state.buildings.insert(BuildingInstance {
        building: building.into(),
        level: 1,
        x,
        y,
        disabled_until: None,
    })
}
