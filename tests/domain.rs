use assert_matches::assert_matches;

use mms_sdc::domain::{DataSelector, DataType, SelectorGuard, Site, Values};
use mms_sdc::error::SdcError;

#[test]
fn files_clear_attributes_and_reset_site() {
    let mut selector = DataSelector::new();
    selector.set_spacecraft(Some("mms1".into()));
    selector.set_instrument(Some("fgm".into()));
    selector.set_level(Some("l1b".into()));
    assert_eq!(selector.site(), Site::Restricted);

    selector.set_files(Some(vec!["mms1_fgm_srvy_l1b_20151016_v4.18.0.cdf".to_string()]));
    assert_eq!(selector.spacecraft(), None);
    assert_eq!(selector.instrument(), None);
    assert_eq!(selector.level(), None);
    assert_eq!(selector.site(), Site::Public);
}

#[test]
fn empty_file_list_is_ignored() {
    let mut selector = DataSelector::new();
    selector.set_spacecraft(Some("mms1".into()));
    selector.set_files(Some(Vec::new()));
    assert_eq!(selector.files(), None);
    assert_eq!(selector.spacecraft(), Some(&Values::from("mms1")));
}

#[test]
fn ancillary_product_switches_data_type() {
    let mut selector = DataSelector::new();
    assert_eq!(selector.data_type(), DataType::Science);
    selector.set_ancillary_product(Some("defatt".into()));
    assert_eq!(selector.data_type(), DataType::Ancillary);
}

#[test]
fn guard_restores_selector_on_drop() {
    let mut selector = DataSelector::new();
    selector.set_spacecraft(Some("mms1".into()));
    selector.set_level(Some("l1b".into()));
    let before = selector.clone();

    {
        let mut guard = SelectorGuard::new(&mut selector);
        guard.set_files(Some(vec!["mms1_fgm_srvy_l1b_20151016_v4.18.0.cdf".to_string()]));
        assert_eq!(guard.spacecraft(), None);
    }
    assert_eq!(selector, before);
}

#[test]
fn parse_data_type() {
    assert_eq!("hk".parse::<DataType>().unwrap(), DataType::Housekeeping);
    assert_eq!("ancillary".parse::<DataType>().unwrap(), DataType::Ancillary);
    assert_matches!("level0".parse::<DataType>(), Err(SdcError::InvalidSelector(_)));
}

#[test]
fn values_from_shorthand() {
    let values: Values = "mms1, mms2".parse().unwrap();
    assert_eq!(values.as_slice(), ["mms1", "mms2"]);
    assert_eq!(values.joined(), "mms1,mms2");
}
