use crate::models::MedicineEntity;

/// Case-insensitive substring filter over medicine names and descriptions.
/// Keeps the input order and applies no relevance ranking; callers load the
/// candidate set ordered by id. A blank query matches everything.
pub fn filter_medicines(medicines: Vec<MedicineEntity>, query: &str) -> Vec<MedicineEntity> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return medicines;
    }
    medicines
        .into_iter()
        .filter(|medicine| {
            medicine.name.to_lowercase().contains(&needle)
                || medicine
                    .description
                    .as_deref()
                    .is_some_and(|description| description.to_lowercase().contains(&needle))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn medicine(id: i32, name: &str, description: Option<&str>) -> MedicineEntity {
        let now = Utc::now();
        MedicineEntity {
            id,
            seller_id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            price: 10.0,
            stock_quantity: 5,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn substring_match_on_name() {
        let meds = vec![
            medicine(1, "Paracetamol", None),
            medicine(2, "Ibuprofen", None),
        ];
        let hits = filter_medicines(meds, "para");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Paracetamol");
    }

    #[test]
    fn match_is_case_insensitive() {
        let meds = vec![medicine(1, "Paracetamol", None)];
        assert_eq!(filter_medicines(meds.clone(), "PARA").len(), 1);
        assert_eq!(filter_medicines(meds, "pArAcEt").len(), 1);
    }

    #[test]
    fn description_is_searched_too() {
        let meds = vec![
            medicine(1, "Tylenol", Some("paracetamol based pain relief")),
            medicine(2, "Ibuprofen", Some("NSAID")),
        ];
        let hits = filter_medicines(meds, "paracetamol");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Tylenol");
    }

    #[test]
    fn blank_query_matches_everything() {
        let meds = vec![
            medicine(1, "Paracetamol", None),
            medicine(2, "Ibuprofen", None),
        ];
        assert_eq!(filter_medicines(meds.clone(), "").len(), 2);
        assert_eq!(filter_medicines(meds, "   ").len(), 2);
    }

    #[test]
    fn input_order_is_preserved() {
        let meds = vec![
            medicine(3, "Aspirin Forte", None),
            medicine(1, "Aspirin", None),
            medicine(2, "Aspirin Junior", None),
        ];
        let hits = filter_medicines(meds, "aspirin");
        let ids: Vec<i32> = hits.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn no_match_yields_empty() {
        let meds = vec![medicine(1, "Paracetamol", Some("pain relief"))];
        assert!(filter_medicines(meds, "insulin").is_empty());
    }
}
