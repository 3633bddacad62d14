use super::test_run_project::{entity_economics, pv_system};
use crate::input::Carrier;
use crate::output::SinkOutput;
use crate::run_project;
use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use rstest::*;
use serde_json::json;

fn two_prosumer_community(
    beam: Vec<f64>,
    prosumer_demand: Vec<f64>,
    consumer_demand: Vec<f64>,
    community_battery: bool,
) -> serde_json::Value {
    let mut config = json!({
        "simulation": {"time_step": "1h", "start_date": "2021-06-01", "time_horizon": 15},
        "users": {
            "u1": {"carriers": {"electricity": {"values": prosumer_demand.clone()}}},
            "u2": {"carriers": {"electricity": {"values": prosumer_demand}}},
            "u3": {"carriers": {"electricity": {"values": consumer_demand}}}
        },
        "systems": {"pv1": pv_system(beam.clone()), "pv2": pv_system(beam)},
        "bess": {
            "b1": {
                "tech": {
                    "cap_module": 10., "v": 100., "i_max": 200., "i_min": 0.,
                    "soc_in": 0.5, "soc_max": 0.8, "soc_min": 0.2,
                    "n_series": 1, "n_parallel": 1
                },
                "economics": {"cap_cost": 400., "opex_cost": 5.}
            }
        },
        "prosumers": {
            "p1": {
                "tech": {"carriers": ["electricity"], "users": ["u1"], "systems": ["pv1"]},
                "economics": entity_economics()
            },
            "p2": {
                "tech": {"carriers": ["electricity"], "users": ["u2"], "systems": ["pv2"]},
                "economics": entity_economics()
            }
        },
        "rec": {
            "rec1": {
                "tech": {"carriers": ["electricity"], "prosumers": ["p1", "p2"], "consumers": ["u3"]},
                "economics": entity_economics()
            }
        }
    });
    if community_battery {
        config["rec"]["rec1"]["tech"]["bess"] = json!(["b1"]);
    }
    config
}

#[rstest]
#[case::sunny_day(vec![800., 1000., 600., 0.], vec![12., 12., 12., 12.], vec![30., 80., 10., 5.])]
#[case::night(vec![0., 0., 0., 0.], vec![3., 3., 3., 3.], vec![1., 2., 3., 4.])]
#[case::no_consumer_demand(vec![1000., 1000., 1000., 1000.], vec![5., 5., 5., 5.], vec![0., 0., 0., 0.])]
fn test_shared_energy_is_matched_net_flows(
    #[case] beam: Vec<f64>,
    #[case] prosumer_demand: Vec<f64>,
    #[case] consumer_demand: Vec<f64>,
) {
    let config = two_prosumer_community(beam, prosumer_demand, consumer_demand.clone(), false);

    let results = run_project(config.to_string().as_bytes(), SinkOutput, None, None).unwrap();

    let energy = &results.communities["rec1"].energy[&Carrier::Electricity];
    assert!(energy.storage.is_none());
    for step in 0..4 {
        let expected = energy.production_net[step].min(energy.demand_net[step]);
        assert_relative_eq!(energy.shared[step], expected, epsilon = 1e-9);
        assert_relative_eq!(
            energy.production_net[step],
            energy.surplus_prosumers[step],
            epsilon = 1e-9
        );
        assert_relative_eq!(
            energy.demand_net[step],
            energy.unmet_prosumers[step] + consumer_demand[step],
            epsilon = 1e-9
        );
        assert_relative_eq!(
            energy.surplus[step],
            energy.production_net[step] - energy.shared[step],
            epsilon = 1e-9
        );
        assert_relative_eq!(
            energy.unmet[step],
            energy.demand_net[step] - energy.shared[step],
            epsilon = 1e-9
        );
    }
}

#[rstest]
fn test_community_battery_shifts_surplus_to_later_demand() {
    let config = two_prosumer_community(
        vec![1000., 0.],
        vec![10., 10.],
        vec![20., 20.],
        true,
    );

    let results = run_project(config.to_string().as_bytes(), SinkOutput, None, None).unwrap();

    let community = &results.communities["rec1"];
    let energy = &community.energy[&Carrier::Electricity];
    let storage = energy.storage.as_ref().unwrap();
    // surplus of about 60 kW in the first hour, the battery has 3 kWh of headroom
    assert_relative_eq!(storage.stored[0], 3., max_relative = 1e-9);
    assert_eq!(storage.stored[1], 0.);
    // at night everything is demand, the battery gives back what it holds above soc_min
    assert_relative_eq!(storage.supplied[1], 6., max_relative = 1e-9);
    assert_relative_eq!(storage.soc[0], 0.8, max_relative = 1e-9);
    assert_relative_eq!(storage.soc[1], 0.2, max_relative = 1e-9);
    assert_eq!(community.batteries["b1"].len(), 2);
    assert_eq!(community.economics.capex, 4000.);
}

#[rstest]
fn test_community_economics_follow_shared_energy() {
    let config = two_prosumer_community(
        vec![1000., 1000.],
        vec![5., 5.],
        vec![50., 50.],
        false,
    );

    let results = run_project(config.to_string().as_bytes(), SinkOutput, None, None).unwrap();

    let community = &results.communities["rec1"];
    let economics = &community.economics;
    assert_eq!(economics.cashflow.len(), 16);
    assert_eq!(economics.capex, 0.);
    assert_eq!(economics.rev_savings[0], 0.);
    assert!(economics.rev_savings[1] > 0.);
    for year in 1..economics.cashflow.len() {
        assert_relative_eq!(
            economics.cashflow_cumulative[year],
            economics.cashflow_cumulative[year - 1] + economics.cashflow[year],
            max_relative = 1e-9
        );
    }
}

#[rstest]
fn test_surplus_of_one_prosumer_covers_deficit_of_the_other() {
    let config = json!({
        "simulation": {"time_step": "1h", "start_date": "2021-06-01", "time_horizon": 10},
        "users": {
            "u1": {"carriers": {"electricity": {"values": [10., 35., 10.]}}},
            "u2": {"carriers": {"electricity": {"values": [8., 8., 8.]}}},
            "u3": {"carriers": {"electricity": {"values": [4., 4., 4.]}}}
        },
        "systems": {"pv1": pv_system(vec![1000., 1000., 0.])},
        "prosumers": {
            "p1": {
                "tech": {"carriers": ["electricity"], "users": ["u1"], "systems": ["pv1"]},
                "economics": entity_economics()
            },
            "p2": {
                "tech": {"carriers": ["electricity"], "users": ["u2"]},
                "economics": entity_economics()
            }
        },
        "rec": {
            "rec1": {
                "tech": {"carriers": ["electricity"], "prosumers": ["p1", "p2"], "consumers": ["u3"]},
                "economics": entity_economics()
            }
        }
    });

    let results = run_project(config.to_string().as_bytes(), SinkOutput, None, None).unwrap();

    // both sunny hours produce the same, about 40 kW
    let produced = results.systems["pv1"].power[0] / 1000.;
    assert_relative_eq!(produced, 40.03, max_relative = 0.02);

    let p2 = &results.prosumers["p2"].energy[&Carrier::Electricity];
    assert_eq!(p2.production, vec![0.; 3]);
    assert_eq!(p2.unmet, vec![8.; 3]);

    let energy = &results.communities["rec1"].energy[&Carrier::Electricity];
    let expected_production_net = [produced - 10., produced - 35., 0.];
    let expected_demand_net = [12., 12., 22.];
    // the net demand is the smaller side in the first hour, the net production in the others
    let expected_shared = [12., produced - 35., 0.];
    for step in 0..3 {
        assert_relative_eq!(
            energy.production_net[step],
            expected_production_net[step],
            epsilon = 1e-9
        );
        assert_relative_eq!(
            energy.demand_net[step],
            expected_demand_net[step],
            epsilon = 1e-9
        );
        assert_relative_eq!(energy.shared[step], expected_shared[step], epsilon = 1e-9);
    }
    assert_relative_eq!(energy.surplus[0], produced - 22., epsilon = 1e-9);
    assert_relative_eq!(energy.unmet[1], 47. - produced, epsilon = 1e-9);
    assert_relative_eq!(energy.unmet[2], 22., epsilon = 1e-9);
    assert_eq!(energy.production_rec, vec![0.; 3]);

    // MWh per year: the community only saves on what it shares, it sells nothing of its own
    let community = &results.communities["rec1"].economics;
    assert_relative_eq!(
        community.rev_savings[1],
        (12. + produced - 35.) / 1000. * 250.,
        max_relative = 1e-9
    );
    assert_eq!(community.rev_from_sale[1], 0.);
    assert_eq!(community.cost_resources[1], 0.);

    // the prosumer with the array sells its surplus and saves on what it uses itself
    let p1 = &results.prosumers["p1"].economics;
    assert_relative_eq!(
        p1.rev_from_sale[1],
        (2. * produced - 45.) / 1000. * 100.,
        max_relative = 1e-9
    );
    assert_relative_eq!(p1.rev_savings[1], 45. / 1000. * 250., max_relative = 1e-9);
    assert_eq!(p1.cost_resources[1], 0.);
    let p2 = &results.prosumers["p2"].economics;
    assert_eq!(p2.rev_from_sale[1], 0.);
    assert_eq!(p2.rev_savings[1], 0.);
}

#[rstest]
fn test_community_arrays_add_to_net_production() {
    let config = json!({
        "simulation": {"time_step": "1h", "start_date": "2021-06-01", "time_horizon": 10},
        "users": {
            "u1": {"carriers": {"electricity": {"values": [50., 50.]}}},
            "u3": {"carriers": {"electricity": {"values": [5., 5.]}}}
        },
        "systems": {
            "pv1": pv_system(vec![1000., 1000.]),
            "pv3": pv_system(vec![1000., 1000.]),
            "pv4": pv_system(vec![500., 0.])
        },
        "prosumers": {
            "p1": {
                "tech": {"carriers": ["electricity"], "users": ["u1"], "systems": ["pv1"]},
                "economics": entity_economics()
            }
        },
        "rec": {
            "rec1": {
                "tech": {
                    "carriers": ["electricity"], "prosumers": ["p1"], "consumers": ["u3"],
                    "rec_systems": ["pv3", "pv4"]
                },
                "economics": entity_economics()
            }
        }
    });

    let results = run_project(config.to_string().as_bytes(), SinkOutput, None, None).unwrap();

    let kilowatts = |id: &str, step: usize| results.systems[id].power[step] / 1000.;
    let energy = &results.communities["rec1"].energy[&Carrier::Electricity];
    let mut production_rec_total = 0.;
    for step in 0..2 {
        let production_rec = kilowatts("pv3", step) + kilowatts("pv4", step);
        let unmet_p1 = 50. - kilowatts("pv1", step);
        production_rec_total += production_rec;

        assert_relative_eq!(energy.production_rec[step], production_rec, epsilon = 1e-9);
        assert_relative_eq!(
            energy.production[step],
            kilowatts("pv1", step) + production_rec,
            epsilon = 1e-9
        );
        // the prosumer uses all its own production, so only the community arrays are left
        assert_relative_eq!(energy.production_net[step], production_rec, epsilon = 1e-9);
        assert_relative_eq!(energy.demand_net[step], unmet_p1 + 5., epsilon = 1e-9);
        assert_relative_eq!(energy.shared[step], unmet_p1 + 5., epsilon = 1e-9);
        assert_relative_eq!(
            energy.surplus[step],
            production_rec - unmet_p1 - 5.,
            epsilon = 1e-9
        );
    }
    assert!(kilowatts("pv4", 0) > 0.);
    assert_eq!(kilowatts("pv4", 1), 0.);

    let economics = &results.communities["rec1"].economics;
    // the community sells everything its arrays produce
    assert_relative_eq!(
        economics.rev_from_sale[1],
        production_rec_total / 1000. * 100.,
        max_relative = 1e-9
    );
    assert_relative_eq!(
        economics.cost_taxes_on_sale[1],
        economics.rev_from_sale[1] * 0.2,
        max_relative = 1e-9
    );
    assert_relative_eq!(economics.capex, 2. * 40.0316 * 1500., max_relative = 1e-6);
    assert_eq!(results.communities["rec1"].members.total, 2);
}
